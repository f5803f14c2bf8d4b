//! Orchestration core for chatflow
//!
//! Hosts the workflow engine, the Redis-backed task queue and worker pool,
//! the stream buffer registry that keeps partial model output recoverable
//! across client disconnects, the conversational agent layer, JSON blob
//! storage, and the HTTP/SSE/WebSocket API surface.

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod models;
pub mod queue;
pub mod storage;
pub mod streaming;
pub mod tools;

use thiserror::Error;

/// Errors that can occur during orchestration
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Workflow not registered
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Task not present in the queue backend
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Knowledge base not present in the store
    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    /// Resource already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Workflow execution failed
    #[error("Workflow execution failed: {0}")]
    ExecutionFailed(String),

    /// Execution exceeded a deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Execution was cancelled cooperatively
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Queue backend failure
    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    /// Graph model or expression failure
    #[error(transparent)]
    Graph(#[from] flowgraph::GraphError),

    /// Language model failure
    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    /// Storage I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::Storage(err.to_string())
    }
}

impl From<tooling::ToolingError> for OrchestratorError {
    fn from(err: tooling::ToolingError) -> Self {
        match err {
            tooling::ToolingError::Timeout { operation, seconds } => {
                OrchestratorError::Timeout(format!("{} after {}s", operation, seconds))
            }
            other => OrchestratorError::Internal(other.to_string()),
        }
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

pub use engine::WorkflowEngine;
pub use models::task::{Task, TaskKind, TaskStatus};
pub use queue::{TaskQueue, WorkerPool};
pub use streaming::{ResponseHandler, StreamBuffer, StreamRegistry};
