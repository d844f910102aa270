//! splatflow - flow-based warping and correlation kernels
//!
//! splatflow implements the numerical core of flow-based frame
//! interpolation and coarse-to-fine optical flow estimation on `ndarray`
//! tensors in (batch, height, width, channels) layout.
//!
//! # Architecture
//!
//! splatflow is organized into several key modules:
//!
//! - `correspondence`: Splat corners and bilinear splat weights per source pixel
//! - `forward_warp`: Forward warping (splatting) with summed collisions
//! - `backward_warp`: Bilinear backward warping (spatial transformer sampling)
//! - `cost_volume`: Local correlation volumes for flow estimation
//! - `interpolate`: Bidirectional forward warping toward an intermediate time
//! - `flow`: Flow field construction and inspection
//! - `tensor`: Shape conventions and validation
//!
//! All kernels are pure functions of their inputs. Arguments are validated
//! before any work is done; a failed call computes nothing.

pub mod backward_warp;
pub mod correspondence;
pub mod cost_volume;
pub mod error;
pub mod flow;
pub mod forward_warp;
pub mod interpolate;
pub mod tensor;

pub use backward_warp::backward_warp;
pub use correspondence::{build_correspondences, splat_point, Corner, SplatCorrespondences};
pub use cost_volume::{cost_volume, warped_cost_volume, CostVolumeBuilder, CostVolumeConfig};
pub use error::{Error, Result};
pub use forward_warp::{forward_warp, ForwardWarper, WarpConfig};
pub use interpolate::{warp_pair_to_time, WarpedPair};

/// splatflow version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the splatflow library
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Maximum number of threads to use for parallel processing
    pub max_threads: Option<usize>,
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
}

/// Initialize the splatflow library with the given configuration
///
/// Builds the global rayon pool when `max_threads` is set and installs a
/// `tracing` subscriber when `verbose` or `debug` is set. Both are global,
/// so call this at most once per process.
pub fn init(config: Config) -> Result<()> {
    if let Some(threads) = config.max_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| Error::Init(format!("Failed to initialize thread pool: {}", e)))?;
    }

    if config.verbose || config.debug {
        let level = if config.debug { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(level)
            .try_init()
            .map_err(|e| Error::Init(format!("Failed to initialize logging: {}", e)))?;
    }

    Ok(())
}
