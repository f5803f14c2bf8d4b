//! Shared tooling for the chatflow workspace
//!
//! - `logging` - tracing subscriber setup with console/file/JSON output
//! - `retry` - linear and exponential backoff policies
//! - `timeout` - deadline wrapper for async operations

pub mod logging;
pub mod retry;
pub mod timeout;

use thiserror::Error;

/// Errors that can occur in the tooling crate
#[derive(Debug, Error)]
pub enum ToolingError {
    /// I/O error (log directory creation, file appenders)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation exceeded its deadline
    #[error("Operation '{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// Logging initialization failed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

pub use logging::{setup_logging, LoggingConfig};
pub use retry::{Backoff, RetryPolicy};
pub use timeout::with_timeout;
