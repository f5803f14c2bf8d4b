//! Ambient trace context
//!
//! Trace and request identifiers are carried in tokio task-local storage
//! so they survive every await point without being threaded through call
//! signatures. The API middleware opens a scope per request, the queue
//! client stamps the current trace id into task metadata, and workers
//! re-open a scope from that metadata before invoking handlers.

use tokio::task_local;
use uuid::Uuid;

/// Correlation identifiers for one unit of work
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    /// Trace id, stable across service hops
    pub trace_id: Option<String>,
    /// Request id, unique per API request
    pub request_id: Option<String>,
}

impl TaskContext {
    /// Context with a freshly generated trace and request id
    pub fn generate() -> Self {
        Self {
            trace_id: Some(Uuid::new_v4().to_string()),
            request_id: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Context carrying an existing trace id
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            request_id: None,
        }
    }
}

task_local! {
    static CONTEXT: TaskContext;
}

/// Run a future within the given context scope
pub async fn scope<F>(context: TaskContext, future: F) -> F::Output
where
    F: std::future::Future,
{
    CONTEXT.scope(context, future).await
}

/// Trace id of the ambient context, if any
pub fn current_trace_id() -> Option<String> {
    CONTEXT.try_with(|c| c.trace_id.clone()).ok().flatten()
}

/// Request id of the ambient context, if any
pub fn current_request_id() -> Option<String> {
    CONTEXT.try_with(|c| c.request_id.clone()).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_visible_inside_scope() {
        assert!(current_trace_id().is_none());

        let ctx = TaskContext::with_trace_id("trace-1");
        scope(ctx, async {
            assert_eq!(current_trace_id().as_deref(), Some("trace-1"));
            assert!(current_request_id().is_none());
        })
        .await;

        assert!(current_trace_id().is_none());
    }

    #[tokio::test]
    async fn test_context_survives_awaits() {
        scope(TaskContext::generate(), async {
            let before = current_trace_id();
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            assert_eq!(current_trace_id(), before);
        })
        .await;
    }

    #[tokio::test]
    async fn test_nested_scopes_shadow() {
        scope(TaskContext::with_trace_id("outer"), async {
            scope(TaskContext::with_trace_id("inner"), async {
                assert_eq!(current_trace_id().as_deref(), Some("inner"));
            })
            .await;
            assert_eq!(current_trace_id().as_deref(), Some("outer"));
        })
        .await;
    }
}
