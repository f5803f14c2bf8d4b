//! Knowledge-base endpoints

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::response;
use crate::api::routes::AppState;
use crate::storage::{Document, SearchProvider};

#[derive(Debug, Deserialize)]
pub struct CreateKnowledgeBaseRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// POST /api/knowledge-bases
pub async fn create_knowledge_base(
    State(state): State<AppState>,
    Json(request): Json<CreateKnowledgeBaseRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let base = state
        .knowledge
        .create(request.name, request.description)
        .await
        .map_err(ApiError::from)?;
    Ok(response::created(base))
}

/// GET /api/knowledge-bases
pub async fn list_knowledge_bases(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let bases = state.knowledge.list().await.map_err(ApiError::from)?;
    Ok(response::ok(bases))
}

/// GET /api/knowledge-bases/:id
pub async fn get_knowledge_base(
    State(state): State<AppState>,
    Path(kb_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let base = state
        .knowledge
        .get(&kb_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("knowledge base {}", kb_id)))?;
    Ok(response::ok(base))
}

/// DELETE /api/knowledge-bases/:id
pub async fn delete_knowledge_base(
    State(state): State<AppState>,
    Path(kb_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state
        .knowledge
        .delete(&kb_id)
        .await
        .map_err(ApiError::from)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("knowledge base {}", kb_id)));
    }
    Ok(response::ok(json!({ "deleted": kb_id })))
}

#[derive(Debug, Deserialize)]
pub struct AddDocumentsRequest {
    pub documents: Vec<String>,
}

/// POST /api/knowledge-bases/:id/documents
pub async fn add_documents(
    State(state): State<AppState>,
    Path(kb_id): Path<String>,
    Json(request): Json<AddDocumentsRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.documents.is_empty() {
        return Err(ApiError::BadRequest("documents must not be empty".to_string()));
    }
    let documents = request.documents.into_iter().map(Document::new).collect();
    let count = state
        .knowledge
        .add_documents(&kb_id, documents)
        .await
        .map_err(ApiError::from)?;
    Ok(response::ok(json!({ "document_count": count })))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

/// POST /api/knowledge-bases/:id/search
pub async fn search_knowledge_base(
    State(state): State<AppState>,
    Path(kb_id): Path<String>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<impl IntoResponse> {
    let hits = state
        .knowledge
        .search(&kb_id, &request.query, request.top_k)
        .await
        .map_err(ApiError::from)?;
    Ok(response::ok(hits))
}
