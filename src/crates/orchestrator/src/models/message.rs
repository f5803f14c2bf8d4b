//! Conversation and chat transport models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Author role: user, assistant or system
    pub role: String,
    /// Text content
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An append-only list of messages keyed by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id
    pub id: String,
    /// Messages, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with a fresh id
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message
    pub fn push(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
        self.updated_at = Utc::now();
    }

    /// The most recent `n` messages, oldest first
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Incoming chat request body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// User message
    pub message: String,
    /// Existing conversation to continue
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Prompt template to use instead of the default
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Free-form request context
    #[serde(default)]
    pub context: HashMap<String, Value>,
    /// Request a streaming response
    #[serde(default)]
    pub stream: bool,
}

/// Chat response body
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Assistant reply (possibly partial)
    pub response: String,
    /// Conversation the turn was appended to
    pub conversation_id: String,
    /// Workflow triggered by this turn, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Status of the triggered workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_status: Option<String>,
    /// Tool invocations performed during the turn
    pub tool_calls: Vec<Value>,
    /// Extra response metadata (prompt_id, partial, response_id)
    pub metadata: HashMap<String, Value>,
}
