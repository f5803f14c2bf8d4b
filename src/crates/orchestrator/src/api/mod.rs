//! HTTP/SSE/WebSocket API layer
//!
//! Every endpoint answers with the unified response envelope and carries
//! `X-Trace-Id`/`X-Request-Id` headers. Routes are defined in [`routes`],
//! request handlers in [`handlers`], the WebSocket chat loop in [`ws`].

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod ws;

pub use error::{ApiError, ApiResult};
pub use routes::{create_router, AppState};
