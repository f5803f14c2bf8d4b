//! Scripted chat model for tests
//!
//! Queues replies that are returned in order; streaming replies are split
//! into small chunks so stream consumers exercise their buffering paths.
//! Failures can be scripted between replies to test retry handling.

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{LlmError, Result};
use crate::traits::ChatModel;
use crate::types::{ChatRequest, ChatResponse, TokenStream, ToolCallRequest};

enum Scripted {
    Reply(ChatResponse),
    Failure(String),
}

/// A chat model that replays scripted responses
#[derive(Clone, Default)]
pub struct MockChatModel {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockChatModel {
    /// Create an empty mock; an unscripted call returns an error
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply
    pub fn push_text(&self, content: impl Into<String>) {
        self.script.lock().push_back(Scripted::Reply(ChatResponse {
            content: content.into(),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }));
    }

    /// Queue a reply that requests the given tool calls
    pub fn push_tool_calls(&self, tool_calls: Vec<ToolCallRequest>) {
        self.script.lock().push_back(Scripted::Reply(ChatResponse {
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            ..Default::default()
        }));
    }

    /// Queue a failure
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().push_back(Scripted::Failure(message.into()));
    }

    /// Requests observed so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Number of unconsumed scripted entries
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn next(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(request);
        match self.script.lock().pop_front() {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Failure(message)) => Err(LlmError::Api {
                status: 500,
                message,
            }),
            None => Err(LlmError::Stream("mock script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.next(request)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream> {
        let reply = self.next(request)?;
        let chunks: Vec<String> = reply
            .content
            .split_inclusive(' ')
            .map(|s| s.to_string())
            .collect();

        let stream = stream! {
            for chunk in chunks {
                yield Ok(chunk);
            }
        };
        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
