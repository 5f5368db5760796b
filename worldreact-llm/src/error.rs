//! LLM error types.

use std::time::Duration;

use thiserror::Error;
use worldreact_core::ReactError;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// LLM response was not valid JSON.
    #[error("Failed to parse LLM response as JSON: {0}")]
    ParseError(String),

    /// LLM response parsed but is missing required content.
    #[error("LLM output schema validation failed: {0}")]
    SchemaValidation(String),

    /// Request timed out.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// LLM provider is unavailable.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("All LLM retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, the first one included.
        attempts: u32,
        /// Error reported by the final attempt.
        last_error: String,
    },

    /// Configuration error.
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl From<LlmError> for ReactError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(ms) => ReactError::Timeout(Duration::from_millis(ms)),
            LlmError::ConfigError(msg) => ReactError::Config(msg),
            other => ReactError::Computation(other.to_string()),
        }
    }
}
