//! Request middleware
//!
//! The trace middleware accepts an inbound `X-Trace-Id` (generating one
//! otherwise), assigns a fresh request id, runs the handler inside the
//! ambient task context so logs and envelopes pick the ids up, and stamps
//! both ids onto the response headers.

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::context::{self, TaskContext};

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Scope each request in a trace context and stamp correlation headers
pub async fn trace_context(request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request_id = Uuid::new_v4().to_string();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let context = TaskContext {
        trace_id: Some(trace_id.clone()),
        request_id: Some(request_id.clone()),
    };

    let start = std::time::Instant::now();
    let mut response = context::scope(context, next.run(request)).await;
    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        trace_id,
        request_id,
        "request handled"
    );

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        headers.insert(HeaderName::from_static(TRACE_ID_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Permissive CORS for browser clients
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}

/// HTTP request span logging
pub fn logging_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}
