//! Durable task queue and worker pool
//!
//! Tasks are serialized into a Redis-compatible store and distributed over
//! one list per task kind. Delivery is at-least-once: a task that fails is
//! re-enqueued with backoff until its retry budget runs out.

pub mod client;
pub mod handlers;
pub mod worker;

pub use client::TaskQueue;
pub use handlers::{ChatProcessHandler, KnowledgeSearchHandler, WorkflowExecuteHandler};
pub use worker::{TaskHandler, WorkerPool};
