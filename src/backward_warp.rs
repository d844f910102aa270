//! Backward warping (bilinear sampling)
//!
//! Each output pixel `p` pulls from `features` at `p + flow[p]`, with
//! `flow` in (dx, dy) order. This is the per-pixel spatial transformer
//! sampler a coarse-to-fine flow estimator applies to the second feature
//! map before building its cost volume.
//!
//! The four sample corners are `floor` and `floor + 1` on each axis,
//! clipped to `[0, W - 1]` and `[0, H - 1]`, and the bilinear weights are
//! computed from the clipped corners. When both corners of an axis clip
//! to the same pixel their weights cancel, so a sample at or beyond the
//! last row or column, or before the first, evaluates to 0. Estimator
//! weights trained with this sampler expect exactly that.
//!
//! A non-finite sample position yields NaN in every channel.

use crate::error::Result;
use crate::tensor::{dims_of, ensure_flow_matches, FeatureTensor};
use ndarray::{s, Array4, ArrayBase, ArrayView2, ArrayView3, ArrayViewMut2, Data, Ix4, Zip};
use tracing::debug;

/// Backward warp `features` (B, H, W, C) by `flow` (B, H, W, 2, (dx, dy))
///
/// # Errors
///
/// `InvalidArgument` if the flow shape does not match the features.
pub fn backward_warp<S1, S2>(
    features: &ArrayBase<S1, Ix4>,
    flow: &ArrayBase<S2, Ix4>,
) -> Result<FeatureTensor>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
{
    backward_warp_with(features, flow, true)
}

pub(crate) fn backward_warp_with<S1, S2>(
    features: &ArrayBase<S1, Ix4>,
    flow: &ArrayBase<S2, Ix4>,
    parallel: bool,
) -> Result<FeatureTensor>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
{
    ensure_flow_matches(features, flow)?;
    let dims = dims_of(features);
    debug!(?dims, parallel, "backward warp");

    let mut output = Array4::<f32>::zeros(dims.shape());
    Zip::from(output.outer_iter_mut())
        .and(features.outer_iter())
        .and(flow.outer_iter())
        .for_each(|mut out_b, image, flow_b| {
            let rows = Zip::indexed(out_b.outer_iter_mut()).and(flow_b.outer_iter());
            if parallel {
                rows.par_for_each(|y, out_row, flow_row| {
                    sample_row(y, out_row, flow_row, image.view())
                });
            } else {
                rows.for_each(|y, out_row, flow_row| {
                    sample_row(y, out_row, flow_row, image.view())
                });
            }
        });

    Ok(output)
}

/// Sample one output row
///
/// `out_row` is (W, C), `flow_row` is (W, 2) in (dx, dy) order, `image`
/// is (H, W, C).
fn sample_row(
    y: usize,
    mut out_row: ArrayViewMut2<'_, f32>,
    flow_row: ArrayView2<'_, f32>,
    image: ArrayView3<'_, f32>,
) {
    let (height, width, _) = image.dim();
    if height == 0 || width == 0 {
        return;
    }
    let max_y = (height - 1) as i64;
    let max_x = (width - 1) as i64;

    for (x, (mut out, f)) in out_row
        .outer_iter_mut()
        .zip(flow_row.outer_iter())
        .enumerate()
    {
        let sx = x as f32 + f[0];
        let sy = y as f32 + f[1];
        if !(sx.is_finite() && sy.is_finite()) {
            out.fill(f32::NAN);
            continue;
        }

        let fx = sx.floor() as i64;
        let fy = sy.floor() as i64;
        let x0 = fx.clamp(0, max_x);
        let x1 = fx.saturating_add(1).clamp(0, max_x);
        let y0 = fy.clamp(0, max_y);
        let y1 = fy.saturating_add(1).clamp(0, max_y);

        let (x0f, x1f, y0f, y1f) = (x0 as f32, x1 as f32, y0 as f32, y1 as f32);
        let wa = (x1f - sx) * (y1f - sy);
        let wb = (x1f - sx) * (sy - y0f);
        let wc = (sx - x0f) * (y1f - sy);
        let wd = (sx - x0f) * (sy - y0f);

        let (x0, x1, y0, y1) = (x0 as usize, x1 as usize, y0 as usize, y1 as usize);
        let ia = image.slice(s![y0, x0, ..]);
        let ib = image.slice(s![y1, x0, ..]);
        let ic = image.slice(s![y0, x1, ..]);
        let id = image.slice(s![y1, x1, ..]);

        Zip::from(&mut out)
            .and(ia)
            .and(ib)
            .and(ic)
            .and(id)
            .for_each(|o, &a, &b, &c, &d| *o = wa * a + wb * b + wc * c + wd * d);
    }
}
