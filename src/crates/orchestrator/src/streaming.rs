//! Stream buffer registry and retrying response handler
//!
//! Long-running model calls stream text chunk by chunk. Every chunk is
//! appended to a [`StreamBuffer`] keyed by response id, so a client that
//! disconnects mid-stream can reconnect and recover what was already
//! generated. Buffers reach exactly one terminal state: complete, or
//! errored (with any partial content preserved).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{OrchestratorError, Result};
use llm::TokenStream;

/// In-memory accumulator for a streamed response
#[derive(Debug, Clone, Serialize)]
pub struct StreamBuffer {
    /// Response id the buffer is keyed by
    pub response_id: String,
    /// Conversation the response belongs to, if any
    pub conversation_id: Option<String>,
    /// Collected chunks in arrival order
    pub chunks: Vec<String>,
    /// Set when the stream finished normally
    pub complete: bool,
    /// Set when the stream terminated with an error
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamBuffer {
    fn new(response_id: String, conversation_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            response_id,
            conversation_id,
            chunks: Vec::new(),
            complete: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Concatenation of all chunks
    pub fn content(&self) -> String {
        self.chunks.concat()
    }

    /// Whether any content was collected
    pub fn has_content(&self) -> bool {
        self.chunks.iter().any(|c| !c.is_empty())
    }

    /// Whether the buffer holds a partial (non-complete) response
    pub fn is_partial(&self) -> bool {
        !self.complete && self.has_content()
    }
}

/// Registry of live stream buffers, keyed by response id
#[derive(Default)]
pub struct StreamRegistry {
    buffers: Mutex<HashMap<String, StreamBuffer>>,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer for `response_id`, replacing any previous one
    pub fn create(&self, response_id: &str, conversation_id: Option<String>) -> StreamBuffer {
        let buffer = StreamBuffer::new(response_id.to_string(), conversation_id);
        self.buffers
            .lock()
            .insert(response_id.to_string(), buffer.clone());
        tracing::debug!(response_id, "created stream buffer");
        buffer
    }

    /// Append a chunk; missing buffers are ignored
    pub fn append(&self, response_id: &str, chunk: &str) {
        if let Some(buffer) = self.buffers.lock().get_mut(response_id) {
            buffer.chunks.push(chunk.to_string());
            buffer.updated_at = Utc::now();
        }
    }

    /// Mark the stream finished
    pub fn mark_complete(&self, response_id: &str) {
        if let Some(buffer) = self.buffers.lock().get_mut(response_id) {
            buffer.complete = true;
            buffer.updated_at = Utc::now();
        }
    }

    /// Mark the stream errored; a completed buffer is left untouched so
    /// `complete` and `error` are never both set
    pub fn mark_error(&self, response_id: &str, error: &str) {
        if let Some(buffer) = self.buffers.lock().get_mut(response_id) {
            if !buffer.complete {
                buffer.error = Some(error.to_string());
                buffer.updated_at = Utc::now();
            }
        }
    }

    /// Snapshot of a buffer
    pub fn get(&self, response_id: &str) -> Option<StreamBuffer> {
        self.buffers.lock().get(response_id).cloned()
    }

    /// Full content of a buffer
    pub fn content(&self, response_id: &str) -> Option<String> {
        self.buffers.lock().get(response_id).map(|b| b.content())
    }

    /// Partial content collected so far (same concatenation; named for the
    /// recovery path)
    pub fn partial_content(&self, response_id: &str) -> Option<String> {
        self.content(response_id)
    }

    /// Drop a buffer
    pub fn cleanup(&self, response_id: &str) -> bool {
        self.buffers.lock().remove(response_id).is_some()
    }

    /// Drop all buffers not updated within `age`, returning how many
    pub fn cleanup_older_than(&self, age: Duration) -> usize {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(age).unwrap_or_else(|_| ChronoDuration::seconds(0));
        let mut buffers = self.buffers.lock();
        let before = buffers.len();
        buffers.retain(|_, buffer| buffer.updated_at > cutoff);
        before - buffers.len()
    }

    /// Number of live buffers
    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumes token streams into buffers with retry-and-resume semantics
pub struct ResponseHandler {
    registry: Arc<StreamRegistry>,
    max_retries: u32,
    retry_delay: Duration,
    save_partial: bool,
    /// How long a cancelled buffer is retained for client recovery
    cancel_retention: Duration,
}

impl ResponseHandler {
    /// Create a handler over the given registry
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self {
            registry,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            save_partial: true,
            cancel_retention: Duration::from_secs(5),
        }
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay (linear backoff)
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Keep partial content when all attempts fail
    pub fn with_save_partial(mut self, save_partial: bool) -> Self {
        self.save_partial = save_partial;
        self
    }

    /// Set how long cancelled buffers are retained
    pub fn with_cancel_retention(mut self, retention: Duration) -> Self {
        self.cancel_retention = retention;
        self
    }

    /// The underlying registry
    pub fn registry(&self) -> Arc<StreamRegistry> {
        Arc::clone(&self.registry)
    }

    /// Consume one stream into the buffer, invoking `on_chunk` per chunk
    async fn consume(
        &self,
        response_id: &str,
        stream: &mut TokenStream,
        cancel: &CancellationToken,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(OrchestratorError::Cancelled(response_id.to_string()));
                }
                chunk = stream.next() => {
                    match chunk {
                        Some(Ok(chunk)) => {
                            self.registry.append(response_id, &chunk);
                            on_chunk(&chunk);
                        }
                        Some(Err(err)) => {
                            return Err(OrchestratorError::Llm(err));
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Consume a stream produced by `factory`, retrying on failure
    ///
    /// The buffer persists across attempts, so chunks collected before a
    /// failure are kept. Retries back off linearly
    /// (`retry_delay × (attempt + 1)`). When every attempt fails and
    /// partial content exists, the errored buffer is returned for the
    /// caller to surface as a partial response. Cancellation marks the
    /// buffer `"cancelled"`, schedules its cleanup after the retention
    /// window, and propagates.
    pub async fn process_with_retry<F, Fut>(
        &self,
        response_id: &str,
        conversation_id: Option<String>,
        cancel: CancellationToken,
        mut factory: F,
        mut on_chunk: impl FnMut(&str) + Send,
    ) -> Result<StreamBuffer>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = llm::Result<TokenStream>>,
    {
        if self.registry.get(response_id).is_none() {
            self.registry.create(response_id, conversation_id);
        }

        let mut last_error: Option<OrchestratorError> = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let partial = self
                    .registry
                    .partial_content(response_id)
                    .unwrap_or_default();
                tracing::info!(
                    response_id,
                    attempt = attempt + 1,
                    recovered_len = partial.len(),
                    "retrying stream"
                );
                tokio::time::sleep(self.retry_delay * (attempt + 1)).await;
            }

            let result = match factory().await {
                Ok(mut stream) => {
                    self.consume(response_id, &mut stream, &cancel, &mut on_chunk)
                        .await
                }
                Err(err) => Err(OrchestratorError::Llm(err)),
            };

            match result {
                Ok(()) => {
                    self.registry.mark_complete(response_id);
                    let buffer = self
                        .registry
                        .get(response_id)
                        .ok_or_else(|| OrchestratorError::Internal("buffer vanished".into()))?;
                    tracing::info!(
                        response_id,
                        length = buffer.content().len(),
                        "stream complete"
                    );
                    return Ok(buffer);
                }
                Err(OrchestratorError::Cancelled(id)) => {
                    tracing::warn!(response_id, "stream cancelled");
                    self.registry.mark_error(response_id, "cancelled");
                    self.schedule_cleanup(response_id);
                    return Err(OrchestratorError::Cancelled(id));
                }
                Err(err) => {
                    tracing::warn!(
                        response_id,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "stream attempt failed: {}",
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| OrchestratorError::Internal("stream retries exhausted".into()));
        self.registry.mark_error(response_id, &err.to_string());

        if self.save_partial {
            if let Some(buffer) = self.registry.get(response_id) {
                if buffer.has_content() {
                    tracing::info!(
                        response_id,
                        length = buffer.content().len(),
                        "returning partial response after failed retries"
                    );
                    return Ok(buffer);
                }
            }
        }
        Err(err)
    }

    /// Retain a cancelled buffer briefly, then drop it
    fn schedule_cleanup(&self, response_id: &str) {
        let registry = Arc::clone(&self.registry);
        let response_id = response_id.to_string();
        let retention = self.cancel_retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            registry.cleanup(&response_id);
        });
    }
}
