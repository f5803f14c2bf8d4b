//! Error types for LLM operations

use thiserror::Error;

/// Errors that can occur talking to a language model
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing or empty API key
    #[error("Missing API key (set {0})")]
    MissingApiKey(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The streamed response was malformed or interrupted
    #[error("Stream error: {0}")]
    Stream(String),

    /// The stream exceeded its deadline
    #[error("Stream timed out after {0}s")]
    Timeout(u64),

    /// Response payload could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;
