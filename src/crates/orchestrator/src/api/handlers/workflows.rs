//! Workflow management endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::api::error::{ApiError, ApiResult};
use crate::api::response;
use crate::api::routes::AppState;
use crate::context;
use crate::models::task::{Task, TaskKind};
use flowgraph::Workflow;

/// POST /api/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> ApiResult<impl IntoResponse> {
    state
        .engine
        .register(workflow.clone())
        .await
        .map_err(ApiError::from)?;
    Ok(response::created(workflow))
}

/// POST /api/workflows/upload - multipart YAML or JSON definition
pub async fn upload_workflow(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("missing workflow file".to_string()))?;

    let filename = field.file_name().unwrap_or("workflow.json").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("reading upload failed: {}", e)))?;

    let workflow: Workflow = if filename.ends_with(".yaml") || filename.ends_with(".yml") {
        serde_yaml::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid YAML workflow: {}", e)))?
    } else if filename.ends_with(".json") {
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON workflow: {}", e)))?
    } else {
        return Err(ApiError::BadRequest(format!(
            "unsupported file format: {}",
            filename
        )));
    };

    state
        .engine
        .register(workflow.clone())
        .await
        .map_err(ApiError::from)?;
    Ok(response::created(workflow))
}

/// GET /api/workflows
pub async fn list_workflows(State(state): State<AppState>) -> impl IntoResponse {
    response::ok(state.engine.list())
}

/// GET /api/workflows/:id
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let workflow = state
        .engine
        .get(&workflow_id)
        .ok_or_else(|| ApiError::NotFound(format!("workflow {}", workflow_id)))?;
    Ok(response::ok(workflow))
}

/// GET /api/workflows/search/:keyword
pub async fn search_workflows(
    State(state): State<AppState>,
    Path(keyword): Path<String>,
) -> impl IntoResponse {
    let matches = state.engine.search(&keyword);
    let message = format!("found {} workflows", matches.len());
    response::ok_message(matches, message)
}

#[derive(Debug, Deserialize)]
pub struct ExecuteQuery {
    /// Submit to the task queue instead of executing inline
    #[serde(default = "default_async")]
    pub async_execute: bool,
}

fn default_async() -> bool {
    true
}

/// POST /api/workflows/:id/execute?async_execute=bool
///
/// Asynchronous execution enqueues a task and returns its id; inline
/// execution (or queue unavailability) returns the finished workflow.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<ExecuteQuery>,
    body: Option<Json<HashMap<String, Value>>>,
) -> ApiResult<impl IntoResponse> {
    let variables = body.map(|Json(v)| v).unwrap_or_default();

    if state.engine.get(&workflow_id).is_none() {
        return Err(ApiError::NotFound(format!("workflow {}", workflow_id)));
    }

    if query.async_execute {
        if let Some(queue) = &state.queue {
            let mut task = Task::new(TaskKind::WorkflowExecute)
                .with_param("workflow_id", json!(workflow_id))
                .with_param("variables", json!(variables));
            if let Some(trace_id) = context::current_trace_id() {
                task = task.with_metadata("trace_id", json!(trace_id));
            }

            match queue.enqueue(task).await {
                Ok(task_id) => {
                    return Ok(response::ok(json!({
                        "task_id": task_id,
                        "status": "queued",
                        "workflow_id": workflow_id,
                    })));
                }
                Err(err) => {
                    // Queue down: degrade to inline execution
                    tracing::warn!("queue unavailable, executing inline: {}", err);
                }
            }
        }
    }

    let result = state
        .engine
        .execute(&workflow_id, variables, CancellationToken::new())
        .await
        .map_err(ApiError::from)?;
    Ok(response::ok(json!({
        "task_id": Value::Null,
        "status": result.status.to_string(),
        "workflow": result,
    })))
}
