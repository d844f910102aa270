//! Tensor conventions shared by the kernels
//!
//! Every tensor is an `ndarray` array in (batch, height, width, channels)
//! layout with `f32` elements. The helpers here only inspect shapes; none
//! of them copy data.

use crate::error::{Error, Result};
use ndarray::{Array4, ArrayBase, ArrayView1, Data, Ix4};

/// Feature map or image, shape (B, H, W, C)
pub type FeatureTensor = Array4<f32>;

/// Flow field in pixel units, shape (B, H, W, 2), channel order (dx, dy)
pub type FlowTensor = Array4<f32>;

/// Correlation volume, shape (B, H, W, (2r + 1)^2)
pub type CostVolume = Array4<f32>;

/// Dimensions of a (B, H, W, C) tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Dims {
    /// Number of destination pixels per batch element (H * W)
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// Shape as an `ndarray` pattern
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.batch, self.height, self.width, self.channels)
    }
}

/// Read the dimensions of a rank-4 tensor
pub fn dims_of<S>(tensor: &ArrayBase<S, Ix4>) -> Dims
where
    S: Data,
{
    let (batch, height, width, channels) = tensor.dim();
    Dims {
        batch,
        height,
        width,
        channels,
    }
}

/// Require two tensors to have identical shape
pub fn ensure_same_shape<S1, S2>(
    a: &ArrayBase<S1, Ix4>,
    b: &ArrayBase<S2, Ix4>,
    what: &str,
) -> Result<()>
where
    S1: Data,
    S2: Data,
{
    if a.shape() != b.shape() {
        return Err(Error::invalid_argument(format!(
            "{} shapes differ: {:?} vs {:?}",
            what,
            a.shape(),
            b.shape()
        )));
    }
    Ok(())
}

/// Require `flow` to be (B, H, W, 2) with the batch and spatial extent of
/// `features`
pub fn ensure_flow_matches<S1, S2>(
    features: &ArrayBase<S1, Ix4>,
    flow: &ArrayBase<S2, Ix4>,
) -> Result<()>
where
    S1: Data,
    S2: Data,
{
    let f = dims_of(features);
    let expected = [f.batch, f.height, f.width, 2];
    if flow.shape() != expected {
        return Err(Error::invalid_argument(format!(
            "flow shape {:?} does not match features {:?} (expected {:?})",
            flow.shape(),
            features.shape(),
            expected
        )));
    }
    Ok(())
}

/// Mean over channels of the elementwise product of two feature vectors
///
/// Returns 0 for empty vectors.
pub fn mean_channel_product(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let n = a.len();
    if n == 0 {
        return 0.0;
    }
    a.dot(&b) / n as f32
}
