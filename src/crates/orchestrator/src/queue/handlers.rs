//! Task handlers for the worker pool
//!
//! One handler per task kind: workflow execution, deferred chat turns and
//! knowledge-base searches.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::ChatAgent;
use crate::engine::WorkflowEngine;
use crate::models::message::ChatRequest;
use crate::models::task::Task;
use crate::queue::worker::TaskHandler;
use crate::storage::{KnowledgeStore, SearchProvider};
use crate::{OrchestratorError, Result};

fn param_str(task: &Task, name: &str) -> Result<String> {
    task.params
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            OrchestratorError::ExecutionFailed(format!("task is missing parameter: {}", name))
        })
}

/// Executes `workflow_execute` tasks through the engine
pub struct WorkflowExecuteHandler {
    engine: Arc<WorkflowEngine>,
}

impl WorkflowExecuteHandler {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for WorkflowExecuteHandler {
    async fn handle(&self, task: Task) -> Result<Value> {
        let workflow_id = param_str(&task, "workflow_id")?;
        let variables: HashMap<String, Value> = task
            .params
            .get("variables")
            .and_then(Value::as_object)
            .map(|map| map.clone().into_iter().collect())
            .unwrap_or_default();

        let result = self
            .engine
            .execute(&workflow_id, variables, CancellationToken::new())
            .await?;
        Ok(json!({
            "workflow_id": result.id,
            "status": result.status.to_string(),
            "variables": result.variables,
            "completed_at": result.completed_at,
        }))
    }
}

/// Executes `chat_process` tasks through the chat agent
pub struct ChatProcessHandler {
    chat: Arc<ChatAgent>,
}

impl ChatProcessHandler {
    pub fn new(chat: Arc<ChatAgent>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl TaskHandler for ChatProcessHandler {
    async fn handle(&self, task: Task) -> Result<Value> {
        let message = param_str(&task, "message")?;
        let request = ChatRequest {
            message,
            conversation_id: task
                .params
                .get("conversation_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            prompt_id: task
                .params
                .get("prompt_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            context: Default::default(),
            stream: false,
        };

        let reply = self.chat.chat(request).await?;
        Ok(serde_json::to_value(reply)?)
    }
}

/// Executes `knowledge_search` tasks against the knowledge store
pub struct KnowledgeSearchHandler {
    store: Arc<KnowledgeStore>,
}

impl KnowledgeSearchHandler {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TaskHandler for KnowledgeSearchHandler {
    async fn handle(&self, task: Task) -> Result<Value> {
        let query = param_str(&task, "query")?;
        let kb_id = param_str(&task, "knowledge_base_id")?;
        let top_k = task
            .params
            .get("top_k")
            .and_then(Value::as_u64)
            .unwrap_or(5) as usize;

        let hits = self.store.search(&kb_id, &query, top_k).await?;
        Ok(serde_json::to_value(hits)?)
    }
}
