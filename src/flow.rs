//! Flow field helpers
//!
//! Flow fields cross the public API as (B, H, W, 2) tensors in (dx, dy)
//! order, in pixel units, one vector per source pixel. The kernels work in
//! row-major (dy, dx) order internally; [`to_row_major`] is the single place
//! that reorders.

use crate::tensor::FlowTensor;
use ndarray::{s, Array4, ArrayBase, Axis, Data, Ix4};

/// Zero flow (every pixel stays in place)
pub fn zeros(batch: usize, height: usize, width: usize) -> FlowTensor {
    Array4::zeros((batch, height, width, 2))
}

/// The same (dx, dy) displacement at every pixel
pub fn uniform(batch: usize, height: usize, width: usize, dx: f32, dy: f32) -> FlowTensor {
    let mut flow = zeros(batch, height, width);
    flow.slice_mut(s![.., .., .., 0]).fill(dx);
    flow.slice_mut(s![.., .., .., 1]).fill(dy);
    flow
}

/// Reorder (dx, dy) into (dy, dx)
pub fn to_row_major<S>(flow: &ArrayBase<S, Ix4>) -> Array4<f32>
where
    S: Data<Elem = f32>,
{
    flow.slice(s![.., .., .., ..;-1]).to_owned()
}

/// Multiply every flow vector by `factor`
pub fn scale<S>(flow: &ArrayBase<S, Ix4>, factor: f32) -> FlowTensor
where
    S: Data<Elem = f32>,
{
    flow.mapv(|v| v * factor)
}

/// Whether every flow component is finite
///
/// Non-finite flow is not rejected by the kernels; it propagates into the
/// output. Callers that need robust results check here first.
pub fn is_finite<S>(flow: &ArrayBase<S, Ix4>) -> bool
where
    S: Data<Elem = f32>,
{
    flow.iter().all(|v| v.is_finite())
}

/// Largest vector length in the field (0 for an empty field)
pub fn max_magnitude<S>(flow: &ArrayBase<S, Ix4>) -> f32
where
    S: Data<Elem = f32>,
{
    flow.lanes(Axis(3))
        .into_iter()
        .map(|v| (v[0] * v[0] + v[1] * v[1]).sqrt())
        .fold(0.0f32, f32::max)
}
