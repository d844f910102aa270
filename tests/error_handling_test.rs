//! Error handling tests for splatflow
//!
//! These tests verify that every kernel rejects malformed arguments with
//! `Error::InvalidArgument` instead of panicking, and that degenerate but
//! valid inputs (empty batches, zero-sized images, non-finite flow) are
//! handled without crashing.

use ndarray::{Array4, Array5};
use splatflow::error::Error;
use splatflow::{
    backward_warp, build_correspondences, cost_volume, flow, forward_warp, warp_pair_to_time,
    ForwardWarper, WarpConfig,
};
use std::panic;

// ============================================================================
// Helper Functions
// ============================================================================

/// Test that an operation returns an `InvalidArgument` error (not a panic)
fn assert_invalid_argument<F, R>(f: F, description: &str)
where
    F: FnOnce() -> Result<R, Error> + panic::UnwindSafe,
{
    match panic::catch_unwind(f) {
        Ok(Ok(_)) => panic!("{} succeeded instead of returning an error", description),
        Ok(Err(err)) => assert!(
            err.is_invalid_argument(),
            "{} returned {:?}, expected InvalidArgument",
            description,
            err
        ),
        Err(_) => panic!("Panic occurred during: {}", description),
    }
}

/// Test that a closure does not panic
fn assert_no_panic<F: FnOnce() -> R + panic::UnwindSafe, R>(f: F, description: &str) {
    let result = panic::catch_unwind(f);
    assert!(result.is_ok(), "Panic occurred: {}", description);
}

// ============================================================================
// Shape Mismatch
// ============================================================================

mod shape_mismatch_tests {
    use super::*;

    #[test]
    fn test_flow_with_three_components() {
        assert_invalid_argument(
            || {
                forward_warp(
                    &Array4::<f32>::zeros((1, 4, 4, 3)),
                    &Array4::<f32>::zeros((1, 4, 4, 3)),
                    16,
                )
            },
            "forward warp with 3-component flow",
        );
    }

    #[test]
    fn test_flow_batch_mismatch() {
        assert_invalid_argument(
            || build_correspondences(&Array4::<f32>::zeros((2, 4, 4, 1)), &flow::zeros(1, 4, 4)),
            "correspondences with batch mismatch",
        );
    }

    #[test]
    fn test_flow_transposed_spatial_dims() {
        assert_invalid_argument(
            || backward_warp(&Array4::<f32>::zeros((1, 3, 5, 1)), &flow::zeros(1, 5, 3)),
            "backward warp with transposed flow",
        );
    }

    #[test]
    fn test_cost_volume_channel_mismatch() {
        assert_invalid_argument(
            || {
                cost_volume(
                    &Array4::<f32>::zeros((1, 4, 4, 8)),
                    &Array4::<f32>::zeros((1, 4, 4, 4)),
                    2,
                )
            },
            "cost volume with channel mismatch",
        );
    }

    #[test]
    fn test_interpolation_flow_mismatch() {
        let a = Array4::<f32>::zeros((1, 4, 4, 3));
        assert_invalid_argument(
            || {
                warp_pair_to_time(
                    &a,
                    &a,
                    &flow::zeros(1, 4, 4),
                    &flow::zeros(1, 4, 5),
                    0.5,
                    &WarpConfig::default(),
                )
            },
            "interpolation with mismatched backward flow",
        );
    }
}

// ============================================================================
// Capacity
// ============================================================================

mod capacity_tests {
    use super::*;

    #[test]
    fn test_zero_capacity() {
        assert_invalid_argument(
            || forward_warp(&Array4::<f32>::zeros((1, 1, 1, 1)), &flow::zeros(1, 1, 1), 0),
            "forward warp with zero capacity",
        );
    }

    #[test]
    fn test_capacity_checked_before_flow_shape() {
        // Both arguments are wrong; the capacity error is reported first.
        let err = forward_warp(
            &Array4::<f32>::zeros((1, 8, 8, 1)),
            &Array4::<f32>::zeros((1, 2, 2, 2)),
            10,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_destination_area"));
    }

    #[test]
    fn test_accumulate_checks_capacity() {
        let features = Array4::<f32>::ones((1, 4, 4, 1));
        let corr = build_correspondences(&features, &flow::zeros(1, 4, 4)).unwrap();
        let warper = ForwardWarper::new(WarpConfig::new().with_max_destination_area(8));
        assert_invalid_argument(|| warper.accumulate(&corr), "accumulate with small capacity");
    }

    #[test]
    fn test_accumulate_mismatched_correspondences() {
        let features = Array4::<f32>::ones((1, 3, 3, 1));
        let mut corr = build_correspondences(&features, &flow::zeros(1, 3, 3)).unwrap();
        corr.indices = Array5::zeros((1, 4, 2, 2, 2));
        let warper = ForwardWarper::default();
        assert_invalid_argument(
            || warper.accumulate(&corr),
            "accumulate with indices and values of different extent",
        );
    }

    #[test]
    fn test_accumulate_indices_without_row_col_pairs() {
        let features = Array4::<f32>::ones((1, 3, 3, 1));
        let mut corr = build_correspondences(&features, &flow::zeros(1, 3, 3)).unwrap();
        corr.indices = Array5::zeros((1, 4, 3, 3, 1));
        let warper = ForwardWarper::default();
        assert_invalid_argument(|| warper.accumulate(&corr), "accumulate with 1-wide indices");
    }
}

// ============================================================================
// Degenerate Inputs
// ============================================================================

mod degenerate_input_tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        assert_no_panic(
            || {
                let warped =
                    forward_warp(&Array4::<f32>::zeros((0, 4, 4, 2)), &flow::zeros(0, 4, 4), 16)
                        .unwrap();
                assert_eq!(warped.shape(), &[0, 4, 4, 2]);
            },
            "forward warp of empty batch",
        );
    }

    #[test]
    fn test_zero_sized_image() {
        assert_no_panic(
            || {
                let features = Array4::<f32>::zeros((1, 0, 5, 1));
                let warped = forward_warp(&features, &flow::zeros(1, 0, 5), 0).unwrap();
                assert_eq!(warped.shape(), &[1, 0, 5, 1]);
                let sampled = backward_warp(&features, &flow::zeros(1, 0, 5)).unwrap();
                assert_eq!(sampled.shape(), &[1, 0, 5, 1]);
                let volume = cost_volume(&features, &features, 1).unwrap();
                assert_eq!(volume.shape(), &[1, 0, 5, 9]);
            },
            "kernels on zero-height image",
        );
    }

    #[test]
    fn test_zero_channels() {
        assert_no_panic(
            || {
                let features = Array4::<f32>::zeros((1, 3, 3, 0));
                let volume = cost_volume(&features, &features, 1).unwrap();
                assert!(volume.iter().all(|&v| v == 0.0));
                let warped = forward_warp(&features, &flow::zeros(1, 3, 3), 9).unwrap();
                assert_eq!(warped.shape(), &[1, 3, 3, 0]);
            },
            "kernels on zero-channel features",
        );
    }

    #[test]
    fn test_non_finite_flow_propagates() {
        for value in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN] {
            assert_no_panic(
                || {
                    let features = Array4::<f32>::ones((1, 3, 3, 1));
                    let mut flow = flow::zeros(1, 3, 3);
                    flow[[0, 1, 1, 0]] = value;

                    let warped = forward_warp(&features, &flow, 9).unwrap();
                    assert!(!warped[[0, 1, 1, 0]].is_finite(), "forward warp, flow {}", value);

                    let sampled = backward_warp(&features, &flow).unwrap();
                    assert!(!sampled[[0, 1, 1, 0]].is_finite(), "backward warp, flow {}", value);
                },
                "non-finite flow",
            );
        }
    }
}
