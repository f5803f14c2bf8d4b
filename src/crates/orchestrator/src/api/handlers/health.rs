//! Health endpoint

use axum::response::IntoResponse;
use serde_json::json;

use crate::api::response;

/// GET /health
pub async fn health() -> impl IntoResponse {
    response::ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
