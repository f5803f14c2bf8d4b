//! Task inspection and cancellation endpoints

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::response;
use crate::api::routes::AppState;
use crate::models::task::TaskKind;
use crate::queue::TaskQueue;

fn queue(state: &AppState) -> ApiResult<Arc<TaskQueue>> {
    state
        .queue
        .clone()
        .ok_or_else(|| ApiError::Upstream("task queue is not enabled".to_string()))
}

/// GET /api/workflows/tasks/:task_id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let queue = queue(&state)?;
    let task = queue
        .get(&task_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))?;
    Ok(response::ok(task))
}

/// POST /api/workflows/tasks/:task_id/cancel
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let queue = queue(&state)?;
    let cancelled = queue.cancel(&task_id).await.map_err(ApiError::from)?;
    if !cancelled {
        return Err(ApiError::BadRequest(
            "task cannot be cancelled (already started or unknown)".to_string(),
        ));
    }
    Ok(response::ok(json!({
        "task_id": task_id,
        "status": "cancelled",
    })))
}

/// GET /api/workflows/queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let Some(queue) = state.queue.clone() else {
        return Ok(response::ok(json!({
            "enabled": false,
            "queues": {},
        })));
    };

    let mut queues = serde_json::Map::new();
    for kind in TaskKind::all() {
        let length = queue.queue_length(kind).await.map_err(ApiError::from)?;
        queues.insert(kind.to_string(), json!({ "queue_length": length }));
    }
    Ok(response::ok(json!({
        "enabled": true,
        "queues": queues,
    })))
}
