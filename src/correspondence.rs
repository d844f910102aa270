//! Splat correspondence construction
//!
//! For every source pixel `p` the flow moves it to a real-valued position
//! `t = p + flow[p]`. The pixel is then splatted onto the four integer
//! corners around `t`:
//!
//! ```text
//!   tl = (floor(t.row), floor(t.col))    tr = (floor(t.row), ceil(t.col))
//!   bl = (ceil(t.row),  floor(t.col))    br = (ceil(t.row),  ceil(t.col))
//! ```
//!
//! Each corner receives `(1 - |corner.row - t.row|) * (1 - |corner.col - t.col|)`
//! of the source value. When `t` is integral along an axis, floor and ceil
//! coincide and the corners that duplicate `tl` along that axis get weight
//! zero, so the pixel is never counted twice.
//!
//! Destination corners may lie outside the image. They are kept here and
//! masked by the forward warper.
//!
//! A source pixel whose translated position is not finite (NaN or
//! infinite flow) is not splatted anywhere else: all four corners point
//! back at the source pixel with NaN weight, so the warped output holds
//! NaN at that pixel.

use crate::error::{Error, Result};
use crate::flow;
use crate::tensor::{dims_of, ensure_flow_matches, Dims};
use ndarray::{
    s, Array5, ArrayBase, ArrayView2, ArrayView4, ArrayViewMut3, Axis, Data, Ix4, Zip,
};
use tracing::debug;

/// Number of splat corners per source pixel
pub const CORNER_COUNT: usize = 4;

// -------------------------------------------------------------------------
// Corners
// -------------------------------------------------------------------------

/// Splat corner, in the slot order used by [`SplatCorrespondences`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    /// (floor row, floor col)
    TopLeft,
    /// (floor row, ceil col)
    TopRight,
    /// (ceil row, ceil col)
    BottomRight,
    /// (ceil row, floor col)
    BottomLeft,
}

impl Corner {
    /// All corners in slot order
    pub const ALL: [Corner; CORNER_COUNT] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    /// Slot of this corner along the corner axis
    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomRight => 2,
            Corner::BottomLeft => 3,
        }
    }
}

/// One destination of a splatted pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatTarget {
    /// Destination row (may be out of bounds)
    pub row: i64,
    /// Destination column (may be out of bounds)
    pub col: i64,
    /// Fraction of the source value sent to this destination
    pub weight: f32,
}

/// Corners and weights for a single translated position `(row, col)`
///
/// Weights are non-negative for finite input and sum to 1. Non-finite
/// input yields NaN weights on corners at the origin; see
/// [`splat_source`] for the dense rule.
pub fn splat_point(row: f32, col: f32) -> [SplatTarget; CORNER_COUNT] {
    if !(row.is_finite() && col.is_finite()) {
        return non_finite_targets(0, 0);
    }

    let (row_lo, row_hi) = (row.floor(), row.ceil());
    let (col_lo, col_hi) = (col.floor(), col.ceil());

    // Exact comparison: only an integral coordinate collapses its corners.
    let row_distinct = if row_hi == row { 0.0 } else { 1.0 };
    let col_distinct = if col_hi == col { 0.0 } else { 1.0 };

    let weight = |r: f32, c: f32| (1.0 - (r - row).abs()) * (1.0 - (c - col).abs());
    let target = |r: f32, c: f32, keep: f32| SplatTarget {
        row: r as i64,
        col: c as i64,
        weight: weight(r, c) * keep,
    };

    [
        target(row_lo, col_lo, 1.0),
        target(row_lo, col_hi, col_distinct),
        target(row_hi, col_hi, row_distinct),
        target(row_hi, col_lo, row_distinct * col_distinct),
    ]
}

/// Corners and weights for source pixel `(y, x)` moved by `(dy, dx)`
///
/// Non-finite translated positions keep every corner on the source pixel
/// with NaN weight.
pub fn splat_source(y: usize, x: usize, dy: f32, dx: f32) -> [SplatTarget; CORNER_COUNT] {
    let (row, col) = (y as f32 + dy, x as f32 + dx);
    if row.is_finite() && col.is_finite() {
        splat_point(row, col)
    } else {
        non_finite_targets(y as i64, x as i64)
    }
}

fn non_finite_targets(row: i64, col: i64) -> [SplatTarget; CORNER_COUNT] {
    [SplatTarget {
        row,
        col,
        weight: f32::NAN,
    }; CORNER_COUNT]
}

// -------------------------------------------------------------------------
// Dense correspondences
// -------------------------------------------------------------------------

/// Per-pixel splat corners and pre-weighted values for a whole batch
#[derive(Debug, Clone)]
pub struct SplatCorrespondences {
    /// Destination (row, col) per corner, shape (B, 4, H, W, 2)
    pub indices: Array5<i64>,
    /// Source features times corner weight, shape (B, 4, H, W, C)
    pub values: Array5<f32>,
}

impl SplatCorrespondences {
    /// Dimensions of the source features these were built from
    pub fn dims(&self) -> Dims {
        let (batch, _, height, width, channels) = self.values.dim();
        Dims {
            batch,
            height,
            width,
            channels,
        }
    }

    /// Check that `indices` and `values` describe the same splat grid
    ///
    /// Both fields are public, so correspondences assembled by hand are
    /// validated before use.
    pub fn validate(&self) -> Result<()> {
        let idx = self.indices.shape();
        let val = self.values.shape();
        if idx[1] != CORNER_COUNT || idx[4] != 2 {
            return Err(Error::invalid_argument(format!(
                "correspondence indices shape {:?} is not (B, {}, H, W, 2)",
                idx, CORNER_COUNT
            )));
        }
        if idx[..4] != val[..4] {
            return Err(Error::invalid_argument(format!(
                "correspondence indices {:?} and values {:?} disagree",
                idx, val
            )));
        }
        Ok(())
    }

    /// Destination indices of one corner, shape (B, H, W, 2)
    pub fn corner_indices(&self, corner: Corner) -> ArrayView4<'_, i64> {
        self.indices.index_axis(Axis(1), corner.index())
    }

    /// Weighted values of one corner, shape (B, H, W, C)
    pub fn corner_values(&self, corner: Corner) -> ArrayView4<'_, f32> {
        self.values.index_axis(Axis(1), corner.index())
    }
}

/// Build splat correspondences for `features` moved by `flow`
///
/// `features` is (B, H, W, C); `flow` is (B, H, W, 2) in (dx, dy) order.
/// Fails with `InvalidArgument` when the shapes disagree.
pub fn build_correspondences<S1, S2>(
    features: &ArrayBase<S1, Ix4>,
    flow: &ArrayBase<S2, Ix4>,
) -> Result<SplatCorrespondences>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
{
    build_correspondences_with(features, flow, true)
}

pub(crate) fn build_correspondences_with<S1, S2>(
    features: &ArrayBase<S1, Ix4>,
    flow: &ArrayBase<S2, Ix4>,
    parallel: bool,
) -> Result<SplatCorrespondences>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
{
    ensure_flow_matches(features, flow)?;
    let dims = dims_of(features);
    debug!(?dims, parallel, "building splat correspondences");

    let flow_rm = flow::to_row_major(flow);
    let mut indices = Array5::<i64>::zeros((dims.batch, CORNER_COUNT, dims.height, dims.width, 2));
    let mut values =
        Array5::<f32>::zeros((dims.batch, CORNER_COUNT, dims.height, dims.width, dims.channels));

    Zip::from(indices.outer_iter_mut())
        .and(values.outer_iter_mut())
        .and(features.outer_iter())
        .and(flow_rm.outer_iter())
        .for_each(|mut idx_b, mut val_b, feat_b, flow_b| {
            // Rows of one batch element touch disjoint output slices.
            let rows = Zip::indexed(idx_b.axis_iter_mut(Axis(1)))
                .and(val_b.axis_iter_mut(Axis(1)))
                .and(feat_b.outer_iter())
                .and(flow_b.outer_iter());
            if parallel {
                rows.par_for_each(|y, idx_row, val_row, feat_row, flow_row| {
                    fill_row(y, idx_row, val_row, feat_row, flow_row)
                });
            } else {
                rows.for_each(|y, idx_row, val_row, feat_row, flow_row| {
                    fill_row(y, idx_row, val_row, feat_row, flow_row)
                });
            }
        });

    Ok(SplatCorrespondences { indices, values })
}

/// Fill the corner slots of one source row
///
/// `idx_row` is (4, W, 2), `val_row` is (4, W, C), `feat_row` is (W, C) and
/// `flow_row` is (W, 2) in (dy, dx) order.
fn fill_row(
    y: usize,
    mut idx_row: ArrayViewMut3<'_, i64>,
    mut val_row: ArrayViewMut3<'_, f32>,
    feat_row: ArrayView2<'_, f32>,
    flow_row: ArrayView2<'_, f32>,
) {
    for (x, (feat, f)) in feat_row.outer_iter().zip(flow_row.outer_iter()).enumerate() {
        let targets = splat_source(y, x, f[0], f[1]);
        for (k, target) in targets.iter().enumerate() {
            idx_row[[k, x, 0]] = target.row;
            idx_row[[k, x, 1]] = target.col;
            Zip::from(val_row.slice_mut(s![k, x, ..]))
                .and(&feat)
                .for_each(|out, &v| *out = v * target.weight);
        }
    }
}
