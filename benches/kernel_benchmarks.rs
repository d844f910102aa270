//! Kernel performance benchmarks
//!
//! Run with: cargo bench --bench kernel_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array4;
use splatflow::{
    backward_warp, build_correspondences, cost_volume, ForwardWarper, WarpConfig,
};

/// Create a test feature map with the specified dimensions
fn create_test_features(height: usize, width: usize, channels: usize) -> Array4<f32> {
    Array4::from_shape_fn((1, height, width, channels), |(_, y, x, c)| {
        ((y * 31 + x * 17 + c * 7) % 255) as f32 / 255.0
    })
}

/// Create a smooth sub-pixel flow field
fn create_test_flow(height: usize, width: usize) -> Array4<f32> {
    Array4::from_shape_fn((1, height, width, 2), |(_, y, x, c)| {
        let t = if c == 0 { x as f32 } else { y as f32 };
        (t * 0.05).sin() * 3.5
    })
}

/// Benchmark splat correspondence construction
fn bench_correspondences(c: &mut Criterion) {
    let mut group = c.benchmark_group("correspondences");

    for &(width, height) in &[(160, 90), (320, 180), (640, 360)] {
        let features = create_test_features(height, width, 8);
        let flow = create_test_flow(height, width);
        group.throughput(Throughput::Elements((width * height) as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &(features, flow),
            |b, (features, flow)| b.iter(|| black_box(build_correspondences(features, flow))),
        );
    }

    group.finish();
}

/// Benchmark forward warping, serial and parallel
fn bench_forward_warp(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_warp");

    for &(width, height) in &[(160, 90), (320, 180), (640, 360)] {
        let features = create_test_features(height, width, 8);
        let flow = create_test_flow(height, width);
        group.throughput(Throughput::Elements((width * height) as u64));

        for parallel in [false, true] {
            let warper = ForwardWarper::new(WarpConfig::new().with_parallel(parallel));
            let label = if parallel { "parallel" } else { "serial" };
            group.bench_with_input(
                BenchmarkId::new(label, format!("{}x{}", width, height)),
                &(&features, &flow),
                |b, (features, flow)| b.iter(|| black_box(warper.warp(*features, *flow))),
            );
        }
    }

    group.finish();
}

/// Benchmark backward warping
fn bench_backward_warp(c: &mut Criterion) {
    let mut group = c.benchmark_group("backward_warp");

    for &(width, height) in &[(160, 90), (320, 180), (640, 360)] {
        let features = create_test_features(height, width, 8);
        let flow = create_test_flow(height, width);
        group.throughput(Throughput::Elements((width * height) as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &(features, flow),
            |b, (features, flow)| b.iter(|| black_box(backward_warp(features, flow))),
        );
    }

    group.finish();
}

/// Benchmark cost volume construction at PWC-Net pyramid sizes
fn bench_cost_volume(c: &mut Criterion) {
    let mut group = c.benchmark_group("cost_volume");

    for &(width, height, channels) in &[(40, 24, 128), (80, 48, 96), (160, 96, 32)] {
        let c1 = create_test_features(height, width, channels);
        let c2 = create_test_features(height, width, channels).mapv(|v| 1.0 - v);
        group.throughput(Throughput::Elements((width * height) as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}x{}", width, height, channels)),
            &(c1, c2),
            |b, (c1, c2)| b.iter(|| black_box(cost_volume(c1, c2, 4))),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_correspondences,
    bench_forward_warp,
    bench_backward_warp,
    bench_cost_volume
);

criterion_main!(benches);
