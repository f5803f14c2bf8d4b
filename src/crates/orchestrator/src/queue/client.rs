//! Redis-backed task queue client
//!
//! Key schema:
//! - `task_queue:<kind>` - list of task ids, LPUSH in / BRPOP out (FIFO)
//! - `task:<id>` - serialized task JSON, 7-day TTL
//! - `task_status:<id>` - bare status string, 7-day TTL
//!
//! The connection is health-checked with PING on every operation and
//! re-established transparently. A connection failure fails the operation
//! at hand, never the process.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

use crate::models::task::{Task, TaskKind, TaskStatus};
use crate::{OrchestratorError, Result};

const QUEUE_PREFIX: &str = "task_queue:";
const TASK_PREFIX: &str = "task:";
const STATUS_PREFIX: &str = "task_status:";

/// Retention for task and status keys
const TASK_TTL_SECS: u64 = 86_400 * 7;

/// Client for the Redis-backed task queue
pub struct TaskQueue {
    redis_url: String,
    manager: Mutex<Option<ConnectionManager>>,
    /// Bounds in-flight operations over the multiplexed connection
    permits: Arc<Semaphore>,
}

impl TaskQueue {
    /// Create a client for the given Redis URL; no connection is opened
    /// until the first operation
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            manager: Mutex::new(None),
            permits: Arc::new(Semaphore::new(10)),
        }
    }

    /// Bound the number of concurrent queue operations
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max_connections.max(1)));
        self
    }

    /// Queue key for a task kind
    pub fn queue_key(kind: TaskKind) -> String {
        format!("{}{}", QUEUE_PREFIX, kind)
    }

    /// Storage key for a task
    pub fn task_key(task_id: &str) -> String {
        format!("{}{}", TASK_PREFIX, task_id)
    }

    /// Status key for a task
    pub fn status_key(task_id: &str) -> String {
        format!("{}{}", STATUS_PREFIX, task_id)
    }

    /// Open the connection eagerly
    pub async fn connect(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// Drop the connection
    pub async fn disconnect(&self) {
        self.manager.lock().await.take();
        tracing::info!("task queue disconnected");
    }

    /// Get a healthy connection, reconnecting when the PING fails
    async fn connection(&self) -> Result<ConnectionManager> {
        let mut guard = self.manager.lock().await;

        if let Some(manager) = guard.as_ref() {
            let mut conn = manager.clone();
            match redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => return Ok(conn),
                Err(err) => {
                    tracing::warn!("task queue connection unhealthy, reconnecting: {}", err);
                    guard.take();
                }
            }
        }

        let client = redis::Client::open(self.redis_url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        let mut conn = manager.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        tracing::info!("task queue connected");
        *guard = Some(manager.clone());
        Ok(manager)
    }

    /// Write the task and status keys with refreshed TTLs
    async fn write_task(&self, conn: &mut ConnectionManager, task: &Task) -> Result<()> {
        let payload = serde_json::to_string(task)?;
        let _: () = conn
            .set_ex(Self::task_key(&task.id), payload, TASK_TTL_SECS)
            .await?;
        let _: () = conn
            .set_ex(
                Self::status_key(&task.id),
                task.status.to_string(),
                TASK_TTL_SECS,
            )
            .await?;
        Ok(())
    }

    /// Enqueue a task, marking it queued, and return its id
    pub async fn enqueue(&self, mut task: Task) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::Internal("queue closed".to_string()))?;
        let mut conn = self.connection().await?;

        task.status = TaskStatus::Queued;
        task.updated_at = Utc::now();
        self.write_task(&mut conn, &task).await?;

        let _: () = conn.lpush(Self::queue_key(task.kind), &task.id).await?;
        tracing::info!(task_id = %task.id, kind = %task.kind, "task enqueued");
        Ok(task.id)
    }

    /// Block up to `timeout` for the next task of `kind`
    ///
    /// A dequeued task is marked running with `started_at` set, unless it
    /// was cancelled while waiting in the queue, in which case it is
    /// returned unchanged for the caller to skip.
    pub async fn dequeue(&self, kind: TaskKind, timeout: Duration) -> Result<Option<Task>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::Internal("queue closed".to_string()))?;
        let mut conn = self.connection().await?;

        let popped: Option<(String, String)> = conn
            .brpop(Self::queue_key(kind), timeout.as_secs_f64())
            .await?;
        let Some((_, task_id)) = popped else {
            return Ok(None);
        };

        let payload: Option<String> = conn.get(Self::task_key(&task_id)).await?;
        let Some(payload) = payload else {
            tracing::warn!(task_id = %task_id, "dequeued id with no stored task");
            return Ok(None);
        };
        let mut task: Task = serde_json::from_str(&payload)?;

        // Cancellation raced with the queue pop; leave the task terminal
        if task.status == TaskStatus::Cancelled {
            return Ok(Some(task));
        }

        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        task.updated_at = Utc::now();
        self.write_task(&mut conn, &task).await?;

        tracing::info!(task_id = %task.id, kind = %task.kind, "task dequeued");
        Ok(Some(task))
    }

    /// Load a task by id
    pub async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::Internal("queue closed".to_string()))?;
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(Self::task_key(task_id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Read the bare status of a task
    pub async fn get_status(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::Internal("queue closed".to_string()))?;
        let mut conn = self.connection().await?;
        let status: Option<String> = conn.get(Self::status_key(task_id)).await?;
        Ok(status.and_then(|s| serde_json::from_value(Value::String(s)).ok()))
    }

    /// Overwrite a task, refreshing TTLs
    pub async fn update(&self, task: &mut Task) -> Result<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::Internal("queue closed".to_string()))?;
        let mut conn = self.connection().await?;
        task.updated_at = Utc::now();
        self.write_task(&mut conn, task).await?;
        tracing::debug!(task_id = %task.id, status = %task.status, "task updated");
        Ok(())
    }

    /// Finish a task: failed when `error` is set, completed otherwise
    pub async fn complete(
        &self,
        task_id: &str,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<()> {
        let Some(mut task) = self.get(task_id).await? else {
            tracing::warn!(task_id, "complete called for unknown task");
            return Ok(());
        };

        task.completed_at = Some(Utc::now());
        task.result = result;
        task.status = if error.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };
        task.error = error;
        self.update(&mut task).await?;

        tracing::info!(task_id = %task.id, status = %task.status, "task finished");
        Ok(())
    }

    /// Cancel a task that has not started yet
    ///
    /// Returns `true` only when the task existed and was still pending or
    /// queued; a second call (or a call after the worker picked it up)
    /// returns `false`.
    pub async fn cancel(&self, task_id: &str) -> Result<bool> {
        let Some(mut task) = self.get(task_id).await? else {
            return Ok(false);
        };
        if !task.status.is_cancellable() {
            return Ok(false);
        }

        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Utc::now());
        self.update(&mut task).await?;

        tracing::info!(task_id = %task.id, "task cancelled");
        Ok(true)
    }

    /// Current depth of the queue for `kind`
    pub async fn queue_length(&self, kind: TaskKind) -> Result<usize> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::Internal("queue closed".to_string()))?;
        let mut conn = self.connection().await?;
        let length: usize = conn.llen(Self::queue_key(kind)).await?;
        Ok(length)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("redis_url", &self.redis_url)
            .finish()
    }
}

/// Decide what to do with a task whose handler failed
///
/// Factored out of the worker loop so the retry contract is testable
/// without a live queue: a task under budget is requeued with its count
/// bumped and error cleared; an exhausted task fails permanently.
pub fn retry_or_fail(task: &mut Task, error: &str) -> RetryDecision {
    if task.retry_count < task.max_retries {
        task.retry_count += 1;
        task.status = TaskStatus::Queued;
        task.error = None;
        RetryDecision::Requeue {
            retry_count: task.retry_count,
        }
    } else {
        RetryDecision::Fail {
            error: error.to_string(),
        }
    }
}

/// Outcome of [`retry_or_fail`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue for another attempt
    Requeue { retry_count: u32 },
    /// Budget exhausted, fail permanently
    Fail { error: String },
}
