//! Error types shared across the arbitrator and its ports

use thiserror::Error;

pub use crate::ports::{CaptureError, NarrationError, SinkError};

/// Errors returned by the public control surface
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// The arbitrator loop has exited and no longer accepts commands
    #[error("voice arbiter is not running")]
    Closed,

    /// No speech capture engine exists on this platform
    #[error("speech capture is not available")]
    Unsupported,
}

/// Result alias for control-surface calls
pub type ArbiterResult<T> = Result<T, ArbiterError>;
