//! Cost volume (local correlation) construction
//!
//! For two feature maps of identical shape, every pixel `p` of `c1` is
//! correlated with the pixels of `c2` in a `(2r + 1) x (2r + 1)` window
//! around `p`. Each correlation is the channel mean of the elementwise
//! product. Window positions that fall outside `c2` contribute 0; there is
//! no padding or wrapping.
//!
//! ## Slot layout
//!
//! The window is stored along the last axis. Slot
//! `(a + r) * (2r + 1) + (b + r)` holds the correlation of `c1[y, x]` with
//! `c2[y + a, x + b]`; [`offset_to_slot`] and [`slot_to_offset`] convert
//! between the two. Offsets are enumerated pairing `c1[p]` with
//! `c2[p - (i, j)]` into slot `k(i, j)` and the slot axis is then
//! reversed, which yields the layout above. Models trained against this
//! layout depend on it.

use crate::backward_warp::backward_warp_with;
use crate::error::{Error, Result};
use crate::flow;
use crate::tensor::{dims_of, ensure_same_shape, mean_channel_product, CostVolume};
use ndarray::{s, Array4, ArrayBase, ArrayView2, ArrayView3, ArrayViewMut2, Data, Ix4, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default search range (window side 9, 81 slots)
pub const DEFAULT_SEARCH_RANGE: usize = 4;

// -------------------------------------------------------------------------
// Slot arithmetic
// -------------------------------------------------------------------------

/// Side length of the search window
pub fn window_side(search_range: usize) -> usize {
    2 * search_range + 1
}

/// Number of slots in the volume's last axis, `(2r + 1)^2`
///
/// Overflows for ranges [`checked_search_area`] rejects.
pub fn search_area(search_range: usize) -> usize {
    let side = window_side(search_range);
    side * side
}

/// Number of slots for `search_range`, rejecting ranges whose window does
/// not fit in memory indexing
pub fn checked_search_area(search_range: usize) -> Result<usize> {
    search_range
        .checked_mul(2)
        .and_then(|d| d.checked_add(1))
        .and_then(|side| side.checked_mul(side))
        .filter(|&area| area <= isize::MAX as usize)
        .ok_or_else(|| {
            Error::invalid_argument(format!(
                "search_range {} gives a window larger than isize::MAX slots",
                search_range
            ))
        })
}

/// Slot holding the zero-offset correlation
pub fn center_slot(search_range: usize) -> usize {
    search_range * window_side(search_range) + search_range
}

/// Slot of displacement `(dy, dx)` into `c2`, or `None` outside the window
pub fn offset_to_slot(dy: isize, dx: isize, search_range: usize) -> Option<usize> {
    checked_search_area(search_range).ok()?;
    let r = search_range as isize;
    if dy.abs() > r || dx.abs() > r {
        return None;
    }
    Some(((dy + r) * (2 * r + 1) + (dx + r)) as usize)
}

/// Displacement `(dy, dx)` into `c2` stored at `slot`
pub fn slot_to_offset(slot: usize, search_range: usize) -> Option<(isize, isize)> {
    if slot >= checked_search_area(search_range).ok()? {
        return None;
    }
    let side = window_side(search_range);
    let r = search_range as isize;
    Some(((slot / side) as isize - r, (slot % side) as isize - r))
}

// -------------------------------------------------------------------------
// Configuration
// -------------------------------------------------------------------------

/// Configuration for cost volume construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostVolumeConfig {
    /// Maximum per-axis displacement `r`
    pub search_range: usize,
    /// Compute rows on the rayon pool
    pub parallel: bool,
}

impl Default for CostVolumeConfig {
    fn default() -> Self {
        Self {
            search_range: DEFAULT_SEARCH_RANGE,
            parallel: true,
        }
    }
}

impl CostVolumeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the search range
    pub fn with_search_range(mut self, search_range: usize) -> Self {
        self.search_range = search_range;
        self
    }

    /// Builder: enable or disable parallel execution
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

// -------------------------------------------------------------------------
// Cost Volume Builder
// -------------------------------------------------------------------------

/// Builds correlation volumes with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct CostVolumeBuilder {
    config: CostVolumeConfig,
}

impl CostVolumeBuilder {
    /// Create a new builder with the given configuration
    pub fn new(config: CostVolumeConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &CostVolumeConfig {
        &self.config
    }

    /// Correlate `c1` with `c2`, both (B, H, W, C)
    ///
    /// Returns a (B, H, W, (2r + 1)^2) volume.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `c1` and `c2` differ in shape.
    pub fn build<S1, S2>(
        &self,
        c1: &ArrayBase<S1, Ix4>,
        c2: &ArrayBase<S2, Ix4>,
    ) -> Result<CostVolume>
    where
        S1: Data<Elem = f32>,
        S2: Data<Elem = f32>,
    {
        ensure_same_shape(c1, c2, "cost volume c1/c2")?;
        let dims = dims_of(c1);
        let r = self.config.search_range;
        let area = checked_search_area(r)?;
        dims.batch
            .checked_mul(dims.area())
            .and_then(|n| n.checked_mul(area))
            .filter(|&n| n <= isize::MAX as usize)
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "cost volume of {:?} with {} slots does not fit in memory indexing",
                    dims.shape(),
                    area
                ))
            })?;
        debug!(?dims, search_range = r, slots = area, "building cost volume");

        let mut volume = Array4::<f32>::zeros((dims.batch, dims.height, dims.width, area));
        Zip::from(volume.outer_iter_mut())
            .and(c1.outer_iter())
            .and(c2.outer_iter())
            .for_each(|mut vol_b, c1_b, c2_b| {
                let rows = Zip::indexed(vol_b.outer_iter_mut()).and(c1_b.outer_iter());
                if self.config.parallel {
                    rows.par_for_each(|y, vol_row, c1_row| {
                        correlate_row(y, vol_row, c1_row, c2_b.view(), r)
                    });
                } else {
                    rows.for_each(|y, vol_row, c1_row| {
                        correlate_row(y, vol_row, c1_row, c2_b.view(), r)
                    });
                }
            });

        Ok(volume)
    }
}

/// Correlate `c1` with `c2` over a `(2 * search_range + 1)^2` window
pub fn cost_volume<S1, S2>(
    c1: &ArrayBase<S1, Ix4>,
    c2: &ArrayBase<S2, Ix4>,
    search_range: usize,
) -> Result<CostVolume>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
{
    CostVolumeBuilder::new(CostVolumeConfig::new().with_search_range(search_range)).build(c1, c2)
}

/// Warp `c2` toward `c1` with `flow * pre_warp_scaling`, then correlate
///
/// This is the "warp, then cost volume" step of a coarse-to-fine flow
/// estimator: `flow` is the upsampled estimate from the previous level in
/// (dx, dy) order. With `flow = None`, `c2` is correlated as is.
///
/// # Errors
///
/// `InvalidArgument` on any shape mismatch or a non-finite scaling factor.
pub fn warped_cost_volume<S1, S2, S3>(
    c1: &ArrayBase<S1, Ix4>,
    c2: &ArrayBase<S2, Ix4>,
    flow: Option<&ArrayBase<S3, Ix4>>,
    pre_warp_scaling: f32,
    config: &CostVolumeConfig,
) -> Result<CostVolume>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
    S3: Data<Elem = f32>,
{
    ensure_same_shape(c1, c2, "cost volume c1/c2")?;
    checked_search_area(config.search_range)?;
    let builder = CostVolumeBuilder::new(config.clone());
    match flow {
        Some(flow) => {
            if !pre_warp_scaling.is_finite() {
                return Err(Error::invalid_argument(format!(
                    "pre_warp_scaling must be finite, got {}",
                    pre_warp_scaling
                )));
            }
            let scaled = flow::scale(flow, pre_warp_scaling);
            let warped = backward_warp_with(c2, &scaled, config.parallel)?;
            builder.build(c1, &warped)
        }
        None => builder.build(c1, c2),
    }
}

/// Fill one row of the volume
///
/// `vol_row` is (W, slots), `c1_row` is (W, C), `c2` is (H, W, C).
fn correlate_row(
    y: usize,
    mut vol_row: ArrayViewMut2<'_, f32>,
    c1_row: ArrayView2<'_, f32>,
    c2: ArrayView3<'_, f32>,
    search_range: usize,
) {
    let (height, width, _) = c2.dim();
    let r = search_range as isize;
    let side = window_side(search_range);
    let last = search_area(search_range) - 1;

    for i in -r..=r {
        let sy = y as isize - i;
        if sy < 0 || sy >= height as isize {
            continue;
        }
        let c2_row = c2.slice(s![sy, .., ..]);
        for j in -r..=r {
            let k = (i + r) as usize * side + (j + r) as usize;
            let slot = last - k;
            for x in 0..width {
                let sx = x as isize - j;
                if sx < 0 || sx >= width as isize {
                    continue;
                }
                vol_row[[x, slot]] =
                    mean_channel_product(c1_row.row(x), c2_row.row(sx as usize));
            }
        }
    }
}
