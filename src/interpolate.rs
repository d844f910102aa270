//! Bidirectional forward warping for frame interpolation
//!
//! To synthesize a frame at time `t` between frames `a` (t = 0) and
//! `b` (t = 1), both endpoints are splatted toward `t`: `a` along
//! `t * flow_ab` and `b` along `(1 - t) * flow_ba`. The two warps run as one
//! batched forward warp, `a` and `b` stacked along the batch axis.

use crate::error::{Error, Result};
use crate::flow;
use crate::forward_warp::{ForwardWarper, WarpConfig};
use crate::tensor::{ensure_flow_matches, ensure_same_shape, FeatureTensor};
use ndarray::{concatenate, s, ArrayBase, Axis, Data, Ix4};
use tracing::debug;

/// Both endpoints warped toward the interpolation time
#[derive(Debug, Clone)]
pub struct WarpedPair {
    /// `a` forward-warped by `t * flow_ab`
    pub a_to_t: FeatureTensor,
    /// `b` forward-warped by `(1 - t) * flow_ba`
    pub b_to_t: FeatureTensor,
}

/// Forward warp `a` and `b` toward time `t` in `[0, 1]`
///
/// `a` and `b` are (B, H, W, C); `flow_ab` is centered on `a` and points to
/// `b`, `flow_ba` is centered on `b` and points to `a`, both (B, H, W, 2)
/// in (dx, dy) order. The destination area bound in `config` applies to
/// each frame.
///
/// # Errors
///
/// `InvalidArgument` on any shape mismatch, a `t` outside `[0, 1]`, or a
/// destination larger than the configured bound.
pub fn warp_pair_to_time<S1, S2, S3, S4>(
    a: &ArrayBase<S1, Ix4>,
    b: &ArrayBase<S2, Ix4>,
    flow_ab: &ArrayBase<S3, Ix4>,
    flow_ba: &ArrayBase<S4, Ix4>,
    t: f32,
    config: &WarpConfig,
) -> Result<WarpedPair>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
    S3: Data<Elem = f32>,
    S4: Data<Elem = f32>,
{
    if !(0.0..=1.0).contains(&t) {
        return Err(Error::invalid_argument(format!(
            "interpolation time must be in [0, 1], got {}",
            t
        )));
    }
    ensure_same_shape(a, b, "interpolation endpoints")?;
    ensure_flow_matches(a, flow_ab)?;
    ensure_flow_matches(b, flow_ba)?;

    let batch = a.len_of(Axis(0));
    debug!(batch, t, "warping frame pair toward interpolation time");

    let features = stack_batches(a, b)?;
    let flows = stack_batches(&flow::scale(flow_ab, t), &flow::scale(flow_ba, 1.0 - t))?;
    let warped = ForwardWarper::new(config.clone()).warp(&features, &flows)?;

    Ok(WarpedPair {
        a_to_t: warped.slice(s![..batch, .., .., ..]).to_owned(),
        b_to_t: warped.slice(s![batch.., .., .., ..]).to_owned(),
    })
}

fn stack_batches<S1, S2>(
    first: &ArrayBase<S1, Ix4>,
    second: &ArrayBase<S2, Ix4>,
) -> Result<FeatureTensor>
where
    S1: Data<Elem = f32>,
    S2: Data<Elem = f32>,
{
    concatenate(Axis(0), &[first.view(), second.view()])
        .map_err(|e| Error::invalid_argument(format!("cannot stack batches: {}", e)))
}
