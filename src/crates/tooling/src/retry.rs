//! Backoff policies for retrying failed operations
//!
//! Two shapes are used across the workspace: linear backoff for the
//! stream response handler (`base × (attempt + 1)`) and exponential
//! backoff for worker requeues and upstream calls.

use std::time::Duration;

/// Backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Delay grows linearly: `base × (attempt + 1)`
    Linear,
    /// Delay doubles each attempt: `base × 2^attempt`
    Exponential,
}

/// Configuration for retrying failed operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay between attempts
    pub base_delay: Duration,
    /// Backoff shape
    pub backoff: Backoff,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Linear backoff policy
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff: Backoff::Linear,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Exponential backoff policy
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Cap individual delays
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt + 1),
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        raw.min(self.max_delay)
    }

    /// Whether retry number `attempt` (0-indexed) is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }
}

/// Run an async operation with retries
///
/// `operation` is called up to `max_retries + 1` times; between attempts
/// the policy's delay is awaited. The last error is returned when all
/// attempts fail.
pub async fn retry_with_policy<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if policy.should_retry(attempt) => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
