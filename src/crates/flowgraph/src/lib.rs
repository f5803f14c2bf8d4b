//! Workflow graph primitives for chatflow
//!
//! This crate provides the building blocks the orchestrator executes:
//! the workflow graph model with its structural invariants, a sandboxed
//! expression evaluator for condition and loop nodes, bounded caches used
//! for conversation and vector-store state, and the tool trait/registry
//! that workflow task nodes and the agent loop dispatch through.

pub mod cache;
pub mod expr;
pub mod tool;
pub mod workflow;

use thiserror::Error;

/// Errors that can occur while building or interpreting workflow graphs
#[derive(Debug, Error)]
pub enum GraphError {
    /// Workflow failed structural validation
    #[error("Invalid workflow: {0}")]
    Validation(String),

    /// Referenced node does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Condition or loop expression could not be parsed or evaluated
    #[error("Expression error: {0}")]
    Expression(String),

    /// Tool lookup or invocation failed
    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    /// Illegal node status transition
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for flowgraph operations
pub type Result<T> = std::result::Result<T, GraphError>;

pub use cache::{LruCache, LruTtlCache, TtlCache};
pub use expr::{evaluate, evaluate_bool};
pub use tool::{FnTool, Tool, ToolRegistry};
pub use workflow::{Edge, Node, NodeKind, NodeStatus, Workflow};
