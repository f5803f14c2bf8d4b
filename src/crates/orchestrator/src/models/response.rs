//! Unified API response envelope
//!
//! Every endpoint answers with the same envelope: an integer `code`
//! mirroring the HTTP status, a message, the payload, an RFC3339
//! timestamp and the correlation ids. Error responses add field-level
//! details and the request path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context;

/// Internal response codes, aligned with HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ResponseCode {
    Success = 200,
    Created = 201,
    Accepted = 202,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    Conflict = 409,
    ValidationError = 422,
    InternalError = 500,
    ServiceUnavailable = 503,
    Timeout = 504,
}

impl ResponseCode {
    /// Numeric code carried in the envelope
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Status code, mirrors HTTP
    pub code: u16,
    /// Human-readable message
    pub message: String,
    /// Payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Response creation time
    pub timestamp: DateTime<Utc>,
    /// Trace id for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Request id for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Success envelope with payload
    pub fn success(data: T) -> Self {
        Self::with_code(ResponseCode::Success, "success", Some(data))
    }

    /// Created envelope with payload
    pub fn created(data: T) -> Self {
        Self::with_code(ResponseCode::Created, "created", Some(data))
    }

    /// Envelope with an explicit code and message
    pub fn with_code(code: ResponseCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            data,
            timestamp: Utc::now(),
            trace_id: context::current_trace_id(),
            request_id: context::current_request_id(),
        }
    }

    /// Override the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Field-level error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Offending field, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Error message
    pub message: String,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorDetail {
    /// Detail naming a specific field
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            code: None,
        }
    }
}

/// Error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Status code, mirrors HTTP
    pub code: u16,
    /// Human-readable message
    pub message: String,
    /// Field-level details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorDetail>>,
    /// Response creation time
    pub timestamp: DateTime<Utc>,
    /// Trace id for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Request id for correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Request path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorBody {
    /// Error envelope with the given code and message
    pub fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            errors: None,
            timestamp: Utc::now(),
            trace_id: context::current_trace_id(),
            request_id: context::current_request_id(),
            path: None,
        }
    }

    /// Attach field-level details
    pub fn with_errors(mut self, errors: Vec<ErrorDetail>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Attach the request path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let envelope = ApiResponse::success(json!({"x": 1}));
        assert_eq!(envelope.code, 200);
        assert_eq!(envelope.message, "success");
        assert_eq!(envelope.data.unwrap()["x"], 1);
    }

    #[test]
    fn test_created_envelope() {
        let envelope = ApiResponse::created("id-1");
        assert_eq!(envelope.code, 201);
    }

    #[test]
    fn test_error_envelope() {
        let body = ErrorBody::new(ResponseCode::ValidationError, "bad input")
            .with_errors(vec![ErrorDetail::field("message", "must not be empty")])
            .with_path("/api/chat");
        assert_eq!(body.code, 422);
        assert_eq!(body.errors.as_ref().unwrap()[0].field.as_deref(), Some("message"));
        assert_eq!(body.path.as_deref(), Some("/api/chat"));
    }

    #[test]
    fn test_envelope_serializes_without_nulls() {
        let envelope: ApiResponse<serde_json::Value> =
            ApiResponse::with_code(ResponseCode::Success, "ok", None);
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("data").is_none());
    }
}
