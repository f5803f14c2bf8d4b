//! Route definitions and shared application state

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::agent::ChatAgent;
use crate::api::{handlers, middleware, ws};
use crate::config::Settings;
use crate::engine::WorkflowEngine;
use crate::queue::TaskQueue;
use crate::storage::{KnowledgeStore, PromptStore};
use crate::streaming::StreamRegistry;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub chat: Arc<ChatAgent>,
    pub queue: Option<Arc<TaskQueue>>,
    pub streams: Arc<StreamRegistry>,
    pub knowledge: Arc<KnowledgeStore>,
    pub prompts: Arc<PromptStore>,
    pub settings: Arc<Settings>,
}

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        // Chat
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/chat/stream", post(handlers::chat::chat_stream))
        .route("/api/ws/chat", get(ws::ws_chat))
        // Workflows
        .route(
            "/api/workflows",
            post(handlers::workflows::create_workflow).get(handlers::workflows::list_workflows),
        )
        .route(
            "/api/workflows/upload",
            post(handlers::workflows::upload_workflow),
        )
        .route(
            "/api/workflows/search/:keyword",
            get(handlers::workflows::search_workflows),
        )
        .route(
            "/api/workflows/queue/stats",
            get(handlers::tasks::queue_stats),
        )
        .route(
            "/api/workflows/tasks/:task_id",
            get(handlers::tasks::get_task),
        )
        .route(
            "/api/workflows/tasks/:task_id/cancel",
            post(handlers::tasks::cancel_task),
        )
        .route("/api/workflows/:id", get(handlers::workflows::get_workflow))
        .route(
            "/api/workflows/:id/execute",
            post(handlers::workflows::execute_workflow),
        )
        // Knowledge bases
        .route(
            "/api/knowledge-bases",
            post(handlers::knowledge::create_knowledge_base)
                .get(handlers::knowledge::list_knowledge_bases),
        )
        .route(
            "/api/knowledge-bases/:id",
            get(handlers::knowledge::get_knowledge_base)
                .delete(handlers::knowledge::delete_knowledge_base),
        )
        .route(
            "/api/knowledge-bases/:id/documents",
            post(handlers::knowledge::add_documents),
        )
        .route(
            "/api/knowledge-bases/:id/search",
            post(handlers::knowledge::search_knowledge_base),
        )
        // Prompt templates
        .route(
            "/api/prompts",
            post(handlers::prompts::create_prompt).get(handlers::prompts::list_prompts),
        )
        .route(
            "/api/prompts/:id",
            get(handlers::prompts::get_prompt)
                .put(handlers::prompts::update_prompt)
                .delete(handlers::prompts::delete_prompt),
        )
        .layer(axum::middleware::from_fn(middleware::trace_context))
        .layer(middleware::logging_layer())
        .layer(middleware::cors_layer())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::WorkflowAgent;
    use crate::streaming::ResponseHandler;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use flowgraph::ToolRegistry;
    use llm::MockChatModel;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(dir: &std::path::Path) -> AppState {
        let streams = Arc::new(StreamRegistry::new());
        let handler = Arc::new(ResponseHandler::new(Arc::clone(&streams)));
        let model = MockChatModel::new();
        model.push_text("hello");
        let engine = Arc::new(WorkflowEngine::new(Arc::new(ToolRegistry::new())));
        let agent = Arc::new(WorkflowAgent::new(
            Arc::new(model),
            Arc::new(ToolRegistry::new()),
            handler,
        ));
        AppState {
            engine,
            chat: Arc::new(ChatAgent::new(agent, 100, Duration::from_secs(3600))),
            queue: None,
            streams,
            knowledge: Arc::new(KnowledgeStore::new(dir.join("knowledge"), 10)),
            prompts: Arc::new(PromptStore::new(dir.join("prompts"))),
            settings: Arc::new(Settings::default()),
        }
    }

    #[tokio::test]
    async fn test_health_route() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-trace-id"));
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 200);
        assert_eq!(body["data"]["response"], "hello");
        assert!(body["data"]["conversation_id"].is_string());
    }

    #[tokio::test]
    async fn test_chat_validation_error_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": ""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 422);
        assert_eq!(body["errors"][0]["field"], "message");
    }

    #[tokio::test]
    async fn test_workflow_register_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = create_router(state);

        let workflow = serde_json::json!({
            "id": "wf-1",
            "name": "sample",
            "nodes": [
                { "id": "start", "name": "start", "type": "start" },
                { "id": "end", "name": "end", "type": "end" }
            ],
            "edges": [ { "source": "start", "target": "end" } ]
        });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from(workflow.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/workflows/wf-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Duplicate registration conflicts
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from(workflow.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/workflows/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_queue_stats_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/workflows/queue/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["enabled"], false);
    }
}
