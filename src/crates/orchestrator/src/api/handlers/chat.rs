//! Chat endpoints
//!
//! `POST /api/chat` answers with the full reply; `POST /api/chat/stream`
//! emits server-sent events, one per chunk, with a final `done=true`
//! event even on failure. A client that lost its stream can resend the
//! same `response_id` (in the request context) within the retention
//! window and receive the partial content that was already generated.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::response;
use crate::api::routes::AppState;
use crate::models::message::ChatRequest;
use crate::models::response::ErrorDetail;
use crate::{context, OrchestratorError};

fn validate(request: &ChatRequest) -> ApiResult<()> {
    if request.message.trim().is_empty() {
        return Err(ApiError::validation(
            "message must not be empty",
            vec![ErrorDetail::field("message", "must not be empty")],
        ));
    }
    Ok(())
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&request)?;
    let reply = state.chat.chat(request).await.map_err(ApiError::from)?;
    Ok(response::ok(reply))
}

/// One SSE frame of the chat stream
fn chunk_event(chunk: &str, response_id: &str) -> Event {
    Event::default().data(
        json!({
            "chunk": chunk,
            "response_id": response_id,
            "done": false,
        })
        .to_string(),
    )
}

fn final_event(
    response_id: &str,
    complete: bool,
    partial: bool,
    error: Option<String>,
) -> Event {
    let mut payload = json!({
        "chunk": "",
        "response_id": response_id,
        "done": true,
        "complete": complete,
    });
    if partial {
        payload["partial"] = json!(true);
    }
    if let Some(error) = error {
        payload["error"] = json!(error);
    }
    Event::default().data(payload.to_string())
}

/// POST /api/chat/stream
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    validate(&request)?;

    let response_id = request
        .context
        .get("response_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    // Reconnect within the retention window: replay what was collected
    if let Some(buffer) = state.streams.get(&response_id) {
        tracing::info!(response_id, "recovering buffered stream");
        let content = buffer.content();
        if !content.is_empty() {
            let _ = tx.send(chunk_event(&content, &response_id));
        }
        let _ = tx.send(final_event(
            &response_id,
            buffer.complete,
            buffer.is_partial(),
            buffer.error.clone(),
        ));
        let stream = UnboundedReceiverStream::new(rx).map(Ok);
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()));
    }

    let cancel = CancellationToken::new();
    let ambient = context::TaskContext {
        trace_id: context::current_trace_id(),
        request_id: context::current_request_id(),
    };

    let chat = state.chat.clone();
    let chunk_tx = tx.clone();
    let chunk_cancel = cancel.clone();
    let task_response_id = response_id.clone();
    tokio::spawn(context::scope(ambient, async move {
        let response_id = task_response_id;
        let on_chunk = {
            let tx = chunk_tx.clone();
            let cancel = chunk_cancel.clone();
            let response_id = response_id.clone();
            move |chunk: &str| {
                // A closed receiver means the client went away
                if tx.send(chunk_event(chunk, &response_id)).is_err() {
                    cancel.cancel();
                }
            }
        };

        match chat
            .chat_stream(request, &response_id, chunk_cancel.clone(), on_chunk)
            .await
        {
            Ok(reply) => {
                let complete = reply
                    .metadata
                    .get("complete")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let partial = reply
                    .metadata
                    .get("partial")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let error = reply
                    .metadata
                    .get("error")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let _ = chunk_tx.send(final_event(&response_id, complete, partial, error));
            }
            Err(OrchestratorError::Cancelled(_)) => {
                // Client gone; the buffer stays recoverable for a few seconds
                tracing::info!(response_id, "stream cancelled by client");
            }
            Err(err) => {
                let _ = chunk_tx.send(final_event(
                    &response_id,
                    false,
                    false,
                    Some(err.to_string()),
                ));
            }
        }
    }));

    let stream = UnboundedReceiverStream::new(rx).map(Ok);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
