//! Domain models shared across the orchestrator

pub mod agent;
pub mod message;
pub mod response;
pub mod task;

pub use agent::{AgentReply, AgentState};
pub use message::{ChatRequest, ChatResponse, Conversation, Message};
pub use response::{ApiResponse, ErrorBody, ErrorDetail, ResponseCode};
pub use task::{Task, TaskKind, TaskStatus};
