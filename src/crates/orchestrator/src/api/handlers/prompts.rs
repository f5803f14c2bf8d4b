//! Prompt template endpoints

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
use crate::storage::PromptTemplate;

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// POST /api/prompts
pub async fn create_prompt(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.name.trim().is_empty() || request.content.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "name and content must not be empty".to_string(),
        ));
    }
    let mut prompt = PromptTemplate::new(request.name, request.content);
    prompt.description = request.description;
    prompt.variables = request.variables;
    prompt.is_default = request.is_default;

    state.prompts.save(&prompt).await.map_err(ApiError::from)?;
    Ok(response::created(prompt))
}

/// GET /api/prompts
pub async fn list_prompts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let prompts = state.prompts.list().await.map_err(ApiError::from)?;
    Ok(response::ok(prompts))
}

/// GET /api/prompts/:id
pub async fn get_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let prompt = state
        .prompts
        .load(&prompt_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("prompt {}", prompt_id)))?;
    Ok(response::ok(prompt))
}

/// PUT /api/prompts/:id
pub async fn update_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
    Json(request): Json<PromptRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut prompt = state
        .prompts
        .load(&prompt_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("prompt {}", prompt_id)))?;

    prompt.name = request.name;
    prompt.content = request.content;
    prompt.description = request.description;
    prompt.variables = request.variables;
    prompt.is_default = request.is_default;
    prompt.updated_at = chrono::Utc::now();

    state.prompts.save(&prompt).await.map_err(ApiError::from)?;
    Ok(response::ok(prompt))
}

/// DELETE /api/prompts/:id
pub async fn delete_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state
        .prompts
        .delete(&prompt_id)
        .await
        .map_err(ApiError::from)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("prompt {}", prompt_id)));
    }
    Ok(response::ok(json!({ "deleted": prompt_id })))
}
