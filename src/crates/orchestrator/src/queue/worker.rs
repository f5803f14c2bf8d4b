//! Worker pool consuming the task queue
//!
//! One consumer loop runs per task kind that has a registered handler.
//! Dequeues use a short timeout so shutdown is observed within a bounded
//! interval. Failed tasks are requeued with exponential backoff until
//! their retry budget is exhausted, then failed permanently with the
//! formatted error chain.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::{self, TaskContext};
use crate::models::task::{Task, TaskKind, TaskStatus};
use crate::queue::client::{retry_or_fail, RetryDecision, TaskQueue};
use crate::Result;
use tooling::RetryPolicy;

/// Handler invoked for each dequeued task of a kind
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Process the task, returning its result value
    async fn handle(&self, task: Task) -> Result<Value>;
}

/// Pool of per-kind queue consumers
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    dequeue_timeout: Duration,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
    consumers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool over the given queue
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            dequeue_timeout: Duration::from_secs(1),
            retry_policy: RetryPolicy::exponential(3, Duration::from_secs(1)),
            cancel: CancellationToken::new(),
            consumers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register the handler for a task kind
    pub fn register(&mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Override the dequeue timeout
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Override the requeue backoff policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Kinds that have a handler registered
    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        self.handlers.keys().copied().collect()
    }

    /// Spawn one consumer loop per registered kind
    pub async fn start(&self) -> Result<()> {
        self.queue.connect().await?;

        let mut consumers = self.consumers.lock().await;
        if !consumers.is_empty() {
            tracing::warn!("worker pool already started");
            return Ok(());
        }

        for (&kind, handler) in &self.handlers {
            let consumer = Consumer {
                queue: Arc::clone(&self.queue),
                handler: Arc::clone(handler),
                kind,
                dequeue_timeout: self.dequeue_timeout,
                retry_policy: self.retry_policy.clone(),
                cancel: self.cancel.child_token(),
            };
            consumers.push(tokio::spawn(consumer.run()));
            tracing::info!(kind = %kind, "worker started");
        }
        Ok(())
    }

    /// Stop all consumers and disconnect the queue
    ///
    /// Cancellation is cooperative: a consumer finishes the dequeue wait
    /// (bounded by the dequeue timeout) and its in-flight handler before
    /// exiting.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut consumers = self.consumers.lock().await;
        for consumer in consumers.drain(..) {
            if let Err(err) = consumer.await {
                tracing::warn!("worker task join failed: {}", err);
            }
        }
        self.queue.disconnect().await;
        tracing::info!("all workers stopped");
    }
}

struct Consumer {
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    kind: TaskKind,
    dequeue_timeout: Duration,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Consumer {
    async fn run(self) {
        tracing::info!(kind = %self.kind, "worker loop running");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let task = tokio::select! {
                _ = self.cancel.cancelled() => break,
                dequeued = self.queue.dequeue(self.kind, self.dequeue_timeout) => {
                    match dequeued {
                        Ok(Some(task)) => task,
                        Ok(None) => continue,
                        Err(err) => {
                            tracing::error!(kind = %self.kind, "dequeue failed: {}", err);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            continue;
                        }
                    }
                }
            };

            // Cancellation raced with the queue pop
            if task.status == TaskStatus::Cancelled {
                tracing::info!(task_id = %task.id, "skipping cancelled task");
                continue;
            }

            // Restore the trace id the producer stamped into the task
            let ctx = match task.trace_id() {
                Some(trace_id) => TaskContext::with_trace_id(trace_id),
                None => TaskContext::default(),
            };
            context::scope(ctx, self.process(task)).await;
        }

        tracing::info!(kind = %self.kind, "worker loop exited");
    }

    async fn process(&self, task: Task) {
        let task_id = task.id.clone();
        tracing::info!(task_id = %task_id, kind = %self.kind, "processing task");

        match self.handler.handle(task.clone()).await {
            Ok(result) => {
                if let Err(err) = self.queue.complete(&task_id, Some(result), None).await {
                    tracing::error!(task_id = %task_id, "failed to record completion: {}", err);
                }
            }
            Err(err) => {
                let chain = format_error_chain(&err);
                tracing::error!(task_id = %task_id, "task handler failed: {}", chain);

                let mut task = task;
                match retry_or_fail(&mut task, &chain) {
                    RetryDecision::Requeue { retry_count } => {
                        if let Err(err) = self.queue.update(&mut task).await {
                            tracing::error!(task_id = %task_id, "failed to persist retry: {}", err);
                            return;
                        }
                        // Delayed requeue instead of an immediate retry storm
                        let delay = self.retry_policy.delay(retry_count.saturating_sub(1));
                        tracing::info!(
                            task_id = %task_id,
                            retry_count,
                            max_retries = task.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "scheduling task retry"
                        );
                        let queue = Arc::clone(&self.queue);
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            if let Err(err) = queue.enqueue(task).await {
                                tracing::error!("failed to requeue task: {}", err);
                            }
                        });
                    }
                    RetryDecision::Fail { error } => {
                        if let Err(err) = self.queue.complete(&task_id, None, Some(error)).await {
                            tracing::error!(task_id = %task_id, "failed to record failure: {}", err);
                        }
                    }
                }
            }
        }
    }
}

/// Format an error with its source chain, one frame per line
fn format_error_chain(err: &crate::OrchestratorError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrchestratorError;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        async fn handle(&self, _task: Task) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_handler_registration() {
        let mut pool = WorkerPool::new(Arc::new(TaskQueue::new("redis://localhost:6379/0")));
        pool.register(TaskKind::WorkflowExecute, Arc::new(NoopHandler));
        pool.register(TaskKind::ChatProcess, Arc::new(NoopHandler));

        let mut kinds = pool.registered_kinds();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![TaskKind::ChatProcess, TaskKind::WorkflowExecute]);
    }

    #[test]
    fn test_retry_delays_back_off() {
        let pool = WorkerPool::new(Arc::new(TaskQueue::new("redis://localhost:6379/0")))
            .with_retry_policy(RetryPolicy::exponential(3, Duration::from_secs(2)));
        assert_eq!(pool.retry_policy.delay(0), Duration::from_secs(2));
        assert_eq!(pool.retry_policy.delay(1), Duration::from_secs(4));
        assert_eq!(pool.retry_policy.delay(2), Duration::from_secs(8));
    }

    #[test]
    fn test_format_error_chain() {
        let err = OrchestratorError::ExecutionFailed("node greet failed".to_string());
        let chain = format_error_chain(&err);
        assert!(chain.contains("node greet failed"));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let pool = WorkerPool::new(Arc::new(TaskQueue::new("redis://localhost:6379/0")));
        pool.stop().await;
    }
}
