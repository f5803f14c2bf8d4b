//! Agent bookkeeping models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Mutable per-conversation agent state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Owning conversation
    pub conversation_id: String,
    /// Workflow currently associated with the conversation
    #[serde(default)]
    pub current_workflow_id: Option<String>,
    /// Workflows triggered over the conversation's lifetime
    #[serde(default)]
    pub workflow_history: Vec<String>,
    /// Tool invocation log
    #[serde(default)]
    pub tool_calls: Vec<Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AgentState {
    /// Create fresh state for a conversation
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            current_workflow_id: None,
            workflow_history: Vec::new(),
            tool_calls: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a triggered workflow
    pub fn record_workflow(&mut self, workflow_id: impl Into<String>) {
        let workflow_id = workflow_id.into();
        self.current_workflow_id = Some(workflow_id.clone());
        self.workflow_history.push(workflow_id);
        self.updated_at = Utc::now();
    }
}

/// Result of one agent turn
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    /// Assistant text (possibly partial)
    pub message: String,
    /// Whether a workflow tool was invoked this turn
    pub workflow_triggered: bool,
    /// Workflow that was executed or submitted
    pub workflow_id: Option<String>,
    /// Status of that workflow, when known
    pub workflow_status: Option<String>,
    /// Tool invocation records
    pub tool_calls: Vec<Value>,
    /// Extra metadata (response_id, partial flag, errors)
    pub metadata: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_workflow() {
        let mut state = AgentState::new("conv-1");
        state.record_workflow("wf-1");
        state.record_workflow("wf-2");
        assert_eq!(state.current_workflow_id.as_deref(), Some("wf-2"));
        assert_eq!(state.workflow_history, vec!["wf-1", "wf-2"]);
    }
}
