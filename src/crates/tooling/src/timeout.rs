//! Deadline wrapper for async operations

use std::future::Future;
use std::time::Duration;

use crate::{Result, ToolingError};

/// Run a future with a deadline
///
/// On expiry the inner future is dropped and a [`ToolingError::Timeout`]
/// naming the operation is returned.
pub async fn with_timeout<T, F>(operation: &str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(value) => Ok(value),
        Err(_) => Err(ToolingError::Timeout {
            operation: operation.to_string(),
            seconds: duration.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_deadline() {
        let result = with_timeout("fast", Duration::from_secs(5), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let result = with_timeout("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        })
        .await;

        match result {
            Err(ToolingError::Timeout { operation, .. }) => assert_eq!(operation, "slow"),
            other => panic!("expected timeout, got {:?}", other.is_ok()),
        }
    }
}
