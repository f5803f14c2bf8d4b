//! API error type and HTTP conversion
//!
//! Maps orchestrator errors onto the stable status codes of the envelope:
//! validation 422, not-found 404, conflict 409, upstream 503, timeout 504,
//! everything unhandled 500 (with the trace id in the body for
//! correlation).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::response::{ErrorBody, ErrorDetail, ResponseCode};
use crate::OrchestratorError;

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the API layer
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body failed validation
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        errors: Vec<ErrorDetail>,
    },

    /// Unknown resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Dependency (model, queue, retrieval) failed
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Deadline exceeded
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Unhandled failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Validation error with field-level details
    pub fn validation(message: impl Into<String>, errors: Vec<ErrorDetail>) -> Self {
        ApiError::Validation {
            message: message.into(),
            errors,
        }
    }

    /// The response code for this error
    pub fn code(&self) -> ResponseCode {
        match self {
            ApiError::BadRequest(_) => ResponseCode::BadRequest,
            ApiError::Validation { .. } => ResponseCode::ValidationError,
            ApiError::NotFound(_) => ResponseCode::NotFound,
            ApiError::Conflict(_) => ResponseCode::Conflict,
            ApiError::Upstream(_) => ResponseCode::ServiceUnavailable,
            ApiError::Timeout(_) => ResponseCode::Timeout,
            ApiError::Internal(_) => ResponseCode::InternalError,
        }
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code().as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::WorkflowNotFound(id) => {
                ApiError::NotFound(format!("workflow {}", id))
            }
            OrchestratorError::TaskNotFound(id) => ApiError::NotFound(format!("task {}", id)),
            OrchestratorError::KnowledgeBaseNotFound(id) => {
                ApiError::NotFound(format!("knowledge base {}", id))
            }
            OrchestratorError::Conflict(message) => ApiError::Conflict(message),
            OrchestratorError::Timeout(message) => ApiError::Timeout(message),
            OrchestratorError::Queue(err) => ApiError::Upstream(err.to_string()),
            OrchestratorError::Llm(err) => ApiError::Upstream(err.to_string()),
            OrchestratorError::Graph(flowgraph::GraphError::Validation(message)) => {
                ApiError::validation(message, Vec::new())
            }
            OrchestratorError::Graph(err) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorBody::new(self.code(), self.to_string());
        if let ApiError::Validation { errors, .. } = self {
            if !errors.is_empty() {
                body = body.with_errors(errors);
            }
        }
        tracing::warn!(code = body.code, "request failed: {}", body.message);
        (status, Json(body)).into_response()
    }
}
