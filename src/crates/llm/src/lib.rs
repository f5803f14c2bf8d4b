//! LLM integration for chatflow
//!
//! This crate stays provider-agnostic: the orchestrator programs against
//! the [`ChatModel`] trait, which models an opaque streaming text
//! generator with tool calling. One concrete client is shipped for
//! OpenAI-compatible chat-completion APIs, plus a scripted mock used
//! throughout the test suites.

pub mod config;
pub mod error;
pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

pub use config::LlmConfig;
pub use error::{LlmError, Result};
pub use mock::MockChatModel;
pub use openai::OpenAiClient;
pub use traits::ChatModel;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Role, TokenStream, ToolCallRequest, ToolDefinition,
    Usage,
};
