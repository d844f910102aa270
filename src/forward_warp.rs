//! Forward warping (splatting)
//!
//! Each source pixel is pushed to its flow-displaced position and spread
//! over the four surrounding integer pixels (see [`crate::correspondence`]).
//! Contributions that land on the same destination are summed; there is no
//! normalization by accumulated weight, so pixels nothing lands on stay
//! exactly zero and pixels several sources land on hold the sum.
//!
//! ## Bounds
//!
//! Corners outside `[0, H) x [0, W)` are masked out before accumulation.
//! Their indices are clamped into the image only so they remain valid
//! array indices; a masked contribution is never added anywhere.
//!
//! A source pixel moved by non-finite flow is not masked. It lands on its
//! own position with NaN weight, so NaN or infinite flow always shows up
//! as NaN in the output.
//!
//! ## Capacity
//!
//! [`WarpConfig::max_destination_area`] is an upper bound on `H * W`. A
//! warp whose destination is larger than the bound fails with
//! `InvalidArgument` before any work is done. `None` sizes the
//! accumulation buffer from the input instead.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use splatflow::forward_warp::{ForwardWarper, WarpConfig};
//!
//! let warper = ForwardWarper::new(WarpConfig::default());
//! let warped = warper.warp(&features, &flow)?;
//! ```

use crate::correspondence::{build_correspondences_with, SplatCorrespondences, CORNER_COUNT};
use crate::error::{Error, Result};
use crate::flow;
use crate::tensor::{dims_of, ensure_flow_matches, Dims, FeatureTensor};
use ndarray::{
    Array, Array2, Array4, ArrayBase, ArrayView4, ArrayViewMut3, Axis, Data, Ix4,
    RemoveAxis, Zip,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

// -------------------------------------------------------------------------
// Constants
// -------------------------------------------------------------------------

/// Default upper bound on destination area (1280x720)
pub const DEFAULT_MAX_DESTINATION_AREA: usize = 1280 * 720;

// -------------------------------------------------------------------------
// Warp Configuration
// -------------------------------------------------------------------------

/// Configuration for forward warping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    /// Upper bound on destination H * W, or `None` to size from the input
    pub max_destination_area: Option<usize>,
    /// Warp batch elements and gather rows on the rayon pool
    pub parallel: bool,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            max_destination_area: Some(DEFAULT_MAX_DESTINATION_AREA),
            parallel: true,
        }
    }
}

impl WarpConfig {
    /// Create a new warp configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the destination area bound
    pub fn with_max_destination_area(mut self, area: usize) -> Self {
        self.max_destination_area = Some(area);
        self
    }

    /// Builder: size the accumulation buffer from each input
    pub fn with_dynamic_capacity(mut self) -> Self {
        self.max_destination_area = None;
        self
    }

    /// Builder: enable or disable parallel execution
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check that a destination of `dims` fits the configured bound
    pub fn check_capacity(&self, dims: &Dims) -> Result<()> {
        match self.max_destination_area {
            Some(max_area) if max_area < dims.area() => {
                let err = Error::invalid_argument(format!(
                    "max_destination_area {} is smaller than destination area {}x{} = {}",
                    max_area,
                    dims.height,
                    dims.width,
                    dims.area()
                ));
                debug!(%err, "rejecting forward warp");
                Err(err)
            }
            _ => Ok(()),
        }
    }
}

// -------------------------------------------------------------------------
// Forward Warper
// -------------------------------------------------------------------------

/// Forward warper (splatting with summed collisions)
#[derive(Debug, Clone, Default)]
pub struct ForwardWarper {
    config: WarpConfig,
}

impl ForwardWarper {
    /// Create a new forward warper with the given configuration
    pub fn new(config: WarpConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &WarpConfig {
        &self.config
    }

    /// Forward warp `features` (B, H, W, C) along `flow` (B, H, W, 2, (dx, dy))
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the flow shape does not match the features or
    /// the destination area exceeds the configured bound. Nothing is
    /// computed in either case.
    pub fn warp<S1, S2>(
        &self,
        features: &ArrayBase<S1, Ix4>,
        flow: &ArrayBase<S2, Ix4>,
    ) -> Result<FeatureTensor>
    where
        S1: Data<Elem = f32>,
        S2: Data<Elem = f32>,
    {
        let dims = dims_of(features);
        self.config.check_capacity(&dims)?;
        ensure_flow_matches(features, flow)?;

        if !flow::is_finite(flow) {
            warn!("flow contains non-finite values; they will propagate into the warped output");
        }
        debug!(
            ?dims,
            max_flow = flow::max_magnitude(flow),
            parallel = self.config.parallel,
            "forward warp"
        );

        let correspondences = build_correspondences_with(features, flow, self.config.parallel)?;
        self.accumulate(&correspondences)
    }

    /// Accumulate prebuilt correspondences into a (B, H, W, C) tensor
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `indices` and `values` are not a consistent
    /// (B, 4, H, W, 2) / (B, 4, H, W, C) pair, or the destination area
    /// exceeds the configured bound.
    pub fn accumulate(&self, correspondences: &SplatCorrespondences) -> Result<FeatureTensor> {
        correspondences.validate()?;
        let dims = correspondences.dims();
        self.config.check_capacity(&dims)?;

        let mut output = Array4::<f32>::zeros(dims.shape());
        let batches = Zip::indexed(output.outer_iter_mut())
            .and(correspondences.indices.outer_iter())
            .and(correspondences.values.outer_iter());

        if self.config.parallel {
            batches.par_for_each(|b, out, indices, values| {
                trace!(batch = b, "accumulating splats");
                accumulate_batch_element(out, indices, values);
            });
        } else {
            batches.for_each(|b, out, indices, values| {
                trace!(batch = b, "accumulating splats");
                accumulate_batch_element(out, indices, values);
            });
        }

        Ok(output)
    }
}

/// Forward warp with an explicit destination area bound
///
/// Fails with `InvalidArgument` when `max_destination_area < H * W`.
pub fn forward_warp<S1, S2>(
    features: &ArrayBase<S1, Ix4>,
    flow: &ArrayBase<S2, Ix4>,
    max_destination_area: usize,
) -> Result<FeatureTensor>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
{
    ForwardWarper::new(WarpConfig::new().with_max_destination_area(max_destination_area))
        .warp(features, flow)
}

// -------------------------------------------------------------------------
// Scatter
// -------------------------------------------------------------------------

/// Whether each (row, col) pair in the last axis lies inside the image
pub fn in_bounds_mask<S, D>(
    indices: &ArrayBase<S, D>,
    height: usize,
    width: usize,
) -> Array<bool, D::Smaller>
where
    S: Data<Elem = i64>,
    D: RemoveAxis,
{
    let last = Axis(indices.ndim() - 1);
    indices.map_axis(last, |rc| is_in_bounds(rc[0], rc[1], height, width))
}

#[inline]
fn is_in_bounds(row: i64, col: i64, height: usize, width: usize) -> bool {
    row >= 0 && col >= 0 && (row as u64) < height as u64 && (col as u64) < width as u64
}

/// Linear destination index of (row, col), clamped into the image
///
/// Only meaningful for in-bounds pairs; out-of-bounds pairs still produce a
/// valid index so they can be carried alongside masked values.
#[inline]
pub fn flat_destination(row: i64, col: i64, height: usize, width: usize) -> usize {
    let max_row = height.saturating_sub(1) as i64;
    let max_col = width.saturating_sub(1) as i64;
    let row = row.clamp(0, max_row) as usize;
    let col = col.clamp(0, max_col) as usize;
    row * width + col
}

/// Sum all in-bounds corner contributions of one batch element
///
/// `indices` is (4, H, W, 2), `values` is (4, H, W, C), `out` is (H, W, C).
/// Corners are visited in slot order and pixels in row-major order, so
/// the summation order is fixed.
fn accumulate_batch_element(
    mut out: ArrayViewMut3<'_, f32>,
    indices: ArrayView4<'_, i64>,
    values: ArrayView4<'_, f32>,
) {
    let (height, width, channels) = out.dim();
    let mut buffer = Array2::<f32>::zeros((height * width, channels));

    for corner in 0..CORNER_COUNT {
        let corner_indices = indices.index_axis(Axis(0), corner);
        let corner_values = values.index_axis(Axis(0), corner);
        let mask = in_bounds_mask(&corner_indices, height, width);

        Zip::from(&mask)
            .and(corner_indices.lanes(Axis(2)))
            .and(corner_values.lanes(Axis(2)))
            .for_each(|&inside, rc, contribution| {
                if !inside {
                    return;
                }
                let dest = flat_destination(rc[0], rc[1], height, width);
                let mut slot = buffer.row_mut(dest);
                slot += &contribution;
            });
    }

    for (mut pixel, summed) in out
        .lanes_mut(Axis(2))
        .into_iter()
        .zip(buffer.outer_iter())
    {
        pixel.assign(&summed);
    }
}
