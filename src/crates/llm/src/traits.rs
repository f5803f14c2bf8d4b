//! Core trait for chat-based language models
//!
//! The orchestrator treats the model as an opaque generator: it sends
//! messages with bound tool schemas and receives either text, tool calls,
//! or a token stream. Implementations must be `Send + Sync` so they can be
//! shared across the agent loop and worker tasks behind an `Arc`.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse, TokenStream};

/// A chat-completion capable language model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete response for the request
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Generate a response as a stream of text chunks
    ///
    /// Tool calls are not delivered over the streaming path; callers that
    /// need tool calling use [`ChatModel::chat`] and stream only the final
    /// text turn.
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream>;

    /// Model identifier for logging
    fn model_name(&self) -> &str;
}
