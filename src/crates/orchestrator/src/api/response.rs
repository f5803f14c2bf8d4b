//! Envelope response helpers

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::models::response::ApiResponse;

/// 200 OK with the success envelope
pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// 200 OK with a custom envelope message
pub fn ok_message<T: Serialize>(data: T, message: impl Into<String>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse::success(data).with_message(message)),
    )
}

/// 201 Created with the success envelope
pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(ApiResponse::created(data)))
}
