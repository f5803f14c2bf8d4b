//! Task model for the durable work queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of deferred work; each kind has its own queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Execute a registered workflow
    WorkflowExecute,
    /// Process a chat message through the agent
    ChatProcess,
    /// Run a knowledge-base search
    KnowledgeSearch,
}

impl TaskKind {
    /// All task kinds
    pub fn all() -> [TaskKind; 3] {
        [
            TaskKind::WorkflowExecute,
            TaskKind::ChatProcess,
            TaskKind::KnowledgeSearch,
        ]
    }

    /// Queue-name fragment for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::WorkflowExecute => "workflow_execute",
            TaskKind::ChatProcess => "chat_process",
            TaskKind::KnowledgeSearch => "knowledge_search",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task lifecycle status
///
/// `Cancelled` is terminal: once set, no further transition is allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether the task can still be cancelled
    pub fn is_cancellable(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Queued)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A unit of deferred work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task id
    pub id: String,
    /// Work kind
    pub kind: TaskKind,
    /// Lifecycle status
    #[serde(default)]
    pub status: TaskStatus,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: HashMap<String, Value>,
    /// Handler result on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Retries performed so far
    #[serde(default)]
    pub retry_count: u32,
    /// Retry budget
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Free-form metadata; `trace_id` is propagated here
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_max_retries() -> u32 {
    3
}

impl Task {
    /// Create a pending task of the given kind
    pub fn new(kind: TaskKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            status: TaskStatus::Pending,
            params: HashMap::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            metadata: HashMap::new(),
        }
    }

    /// Set a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Set a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Trace id carried in metadata, if any
    pub fn trace_id(&self) -> Option<&str> {
        self.metadata.get("trace_id").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new(TaskKind::WorkflowExecute);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_retries, 3);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_status_predicates() {
        assert!(TaskStatus::Pending.is_cancellable());
        assert!(TaskStatus::Queued.is_cancellable());
        assert!(!TaskStatus::Running.is_cancellable());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
    }

    #[test]
    fn test_kind_queue_names() {
        assert_eq!(TaskKind::WorkflowExecute.as_str(), "workflow_execute");
        assert_eq!(TaskKind::all().len(), 3);
    }

    #[test]
    fn test_trace_id_metadata() {
        let task = Task::new(TaskKind::ChatProcess).with_metadata("trace_id", json!("abc-123"));
        assert_eq!(task.trace_id(), Some("abc-123"));
    }

    #[test]
    fn test_serde_round_trip() {
        let task = Task::new(TaskKind::KnowledgeSearch).with_param("query", json!("rust"));
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.kind, TaskKind::KnowledgeSearch);
        assert_eq!(back.params["query"], json!("rust"));
    }
}
