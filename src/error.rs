//! Error types for splatflow

use thiserror::Error;

/// Result type alias for splatflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for splatflow
///
/// Every kernel validates its arguments before touching the data, so an
/// error always means nothing was computed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Shape mismatch between paired tensors, an undersized scatter
    /// capacity, or an out-of-range scalar parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Whether this is an argument validation failure
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}
