//! Error types for the worldreact engine.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all worldreact operations.
///
/// Only [`ReactError::Config`] is ever surfaced to callers of the assessment
/// path; timeouts and computation errors are converted into fallback results
/// by the [`ConcurrencyRunner`](crate::runner::ConcurrencyRunner) and
/// integration errors into degraded reports by the wiring layer.
#[derive(Error, Debug)]
pub enum ReactError {
    /// The external reaction computation did not finish in time.
    #[error("Reaction computation timed out after {0:?}")]
    Timeout(Duration),

    /// The external reaction computation failed.
    #[error("Reaction computation failed: {0}")]
    Computation(String),

    /// The engine is wired into the host incorrectly (missing runtime, closed queue, ...).
    #[error("Integration error: {0}")]
    Integration(String),

    /// An invalid configuration value or runtime adjustment.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ReactError>;
