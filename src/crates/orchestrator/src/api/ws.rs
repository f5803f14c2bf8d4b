//! WebSocket chat endpoint
//!
//! Accepts JSON frames `{message, conversation_id?}` and answers with
//! `{response, conversation_id, workflow_id?, workflow_status?}` or
//! `{error}`. The receive loop is bounded by the configured idle timeout;
//! an idle connection is closed.

use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::api::routes::AppState;
use crate::context::{self, TaskContext};
use crate::models::message::ChatRequest;

/// Inbound chat frame
#[derive(Debug, Deserialize)]
pub struct WsChatFrame {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Outbound reply frame
#[derive(Debug, Serialize)]
pub struct WsReplyFrame {
    pub response: String,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_status: Option<String>,
}

/// GET /api/ws/chat (upgrade)
pub async fn ws_chat(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| chat_loop(socket, state))
}

async fn chat_loop(mut socket: WebSocket, state: AppState) {
    let idle = Duration::from_secs(state.settings.websocket.idle_timeout);
    tracing::info!("websocket chat connected");

    loop {
        // Idle timeout cancels the receive and closes the connection
        let received = match tokio::time::timeout(idle, socket.recv()).await {
            Ok(received) => received,
            Err(_) => {
                tracing::info!("websocket idle timeout");
                let _ = socket
                    .send(WsMessage::Text(
                        json!({ "error": "idle timeout" }).to_string(),
                    ))
                    .await;
                break;
            }
        };

        let message = match received {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                tracing::warn!("websocket receive failed: {}", err);
                break;
            }
        };

        let frame: WsChatFrame = match serde_json::from_str(&message) {
            Ok(frame) => frame,
            Err(err) => {
                let _ = socket
                    .send(WsMessage::Text(
                        json!({ "error": format!("invalid frame: {}", err) }).to_string(),
                    ))
                    .await;
                continue;
            }
        };

        let request = ChatRequest {
            message: frame.message,
            conversation_id: frame.conversation_id,
            prompt_id: None,
            context: Default::default(),
            stream: false,
        };

        // Each frame gets its own trace scope
        let outcome = context::scope(TaskContext::generate(), state.chat.chat(request)).await;
        let reply = match outcome {
            Ok(reply) => json!(WsReplyFrame {
                response: reply.response,
                conversation_id: reply.conversation_id,
                workflow_id: reply.workflow_id,
                workflow_status: reply.workflow_status,
            }),
            Err(err) => json!({ "error": err.to_string() }),
        };

        if socket.send(WsMessage::Text(reply.to_string())).await.is_err() {
            break;
        }
    }

    tracing::info!("websocket chat disconnected");
}
