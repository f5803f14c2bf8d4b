//! Knowledge base storage and retrieval
//!
//! Knowledge-base metadata lives in `knowledge_bases.json`; each base
//! keeps its documents in its own directory. Retrieval goes through the
//! [`SearchProvider`] trait so a vector backend can be plugged in; the
//! built-in provider ranks by keyword overlap. Loaded document sets are
//! held in an LRU cache bounded by `max_vector_stores` so resident memory
//! stays bounded no matter how many bases exist on disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::storage::workflow_store::sanitize;
use crate::{OrchestratorError, Result};
use flowgraph::LruCache;

/// Knowledge-base metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Base id
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Number of stored documents
    #[serde(default)]
    pub document_count: usize,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// A stored document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document id
    pub id: String,
    /// Document text
    pub content: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    /// Create a document with a fresh id
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }
}

/// A retrieval match
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Matched document
    pub document: Document,
    /// Relevance score, higher is better
    pub score: f64,
}

/// Opaque retrieval provider over a knowledge base
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search `kb_id` for `query`, returning up to `top_k` hits
    async fn search(&self, kb_id: &str, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;
}

/// File-backed knowledge store with a bounded document cache
pub struct KnowledgeStore {
    dir: PathBuf,
    /// Loaded document sets, bounded by max_vector_stores
    handles: LruCache<String, Arc<Vec<Document>>>,
    /// Serializes metadata-file rewrites
    meta_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// Create a store rooted at `dir` holding at most `max_vector_stores`
    /// document sets in memory
    pub fn new(dir: impl Into<PathBuf>, max_vector_stores: usize) -> Self {
        Self {
            dir: dir.into(),
            handles: LruCache::new(max_vector_stores),
            meta_lock: Mutex::new(()),
        }
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("knowledge_bases.json")
    }

    fn documents_path(&self, kb_id: &str) -> PathBuf {
        self.dir.join(sanitize(kb_id)).join("documents.json")
    }

    async fn read_meta(&self) -> Result<Vec<KnowledgeBase>> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let payload = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn write_meta(&self, bases: &[KnowledgeBase]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let payload = serde_json::to_string_pretty(bases)?;
        tokio::fs::write(self.meta_path(), payload).await?;
        Ok(())
    }

    /// Create a knowledge base
    pub async fn create(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<KnowledgeBase> {
        let _guard = self.meta_lock.lock().await;
        let now = Utc::now();
        let base = KnowledgeBase {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            document_count: 0,
            created_at: now,
            updated_at: now,
        };

        let mut bases = self.read_meta().await?;
        bases.push(base.clone());
        self.write_meta(&bases).await?;
        tracing::info!(kb_id = %base.id, name = %base.name, "knowledge base created");
        Ok(base)
    }

    /// All knowledge bases
    pub async fn list(&self) -> Result<Vec<KnowledgeBase>> {
        self.read_meta().await
    }

    /// One knowledge base by id
    pub async fn get(&self, kb_id: &str) -> Result<Option<KnowledgeBase>> {
        Ok(self.read_meta().await?.into_iter().find(|b| b.id == kb_id))
    }

    /// Delete a knowledge base and its documents
    pub async fn delete(&self, kb_id: &str) -> Result<bool> {
        let _guard = self.meta_lock.lock().await;
        let mut bases = self.read_meta().await?;
        let before = bases.len();
        bases.retain(|b| b.id != kb_id);
        if bases.len() == before {
            return Ok(false);
        }
        self.write_meta(&bases).await?;
        self.handles.remove(&kb_id.to_string());

        let kb_dir = self.dir.join(sanitize(kb_id));
        if kb_dir.exists() {
            tokio::fs::remove_dir_all(kb_dir).await?;
        }
        Ok(true)
    }

    /// Append documents to a knowledge base
    pub async fn add_documents(&self, kb_id: &str, documents: Vec<Document>) -> Result<usize> {
        let _guard = self.meta_lock.lock().await;
        let mut bases = self.read_meta().await?;
        let base = bases
            .iter_mut()
            .find(|b| b.id == kb_id)
            .ok_or_else(|| OrchestratorError::KnowledgeBaseNotFound(kb_id.to_string()))?;

        let path = self.documents_path(kb_id);
        let mut existing = if path.exists() {
            let payload = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str::<Vec<Document>>(&payload)?
        } else {
            Vec::new()
        };
        existing.extend(documents);

        tokio::fs::create_dir_all(path.parent().unwrap_or(&self.dir)).await?;
        tokio::fs::write(&path, serde_json::to_string_pretty(&existing)?).await?;

        base.document_count = existing.len();
        base.updated_at = Utc::now();
        let count = base.document_count;
        self.write_meta(&bases).await?;

        // The cached handle is stale now
        self.handles.remove(&kb_id.to_string());
        Ok(count)
    }

    /// Documents of a base, through the bounded handle cache
    async fn documents(&self, kb_id: &str) -> Result<Arc<Vec<Document>>> {
        if let Some(handle) = self.handles.get(&kb_id.to_string()) {
            return Ok(handle);
        }

        let path = self.documents_path(kb_id);
        let documents = if path.exists() {
            let payload = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&payload)?
        } else {
            Vec::new()
        };
        let handle = Arc::new(documents);
        self.handles.insert(kb_id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of document sets currently resident
    pub fn cached_handles(&self) -> usize {
        self.handles.len()
    }
}

#[async_trait]
impl SearchProvider for KnowledgeStore {
    async fn search(&self, kb_id: &str, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if self.get(kb_id).await?.is_none() {
            return Err(OrchestratorError::KnowledgeBaseNotFound(kb_id.to_string()));
        }

        let documents = self.documents(kb_id).await?;
        let terms: HashSet<String> = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = documents
            .iter()
            .filter_map(|doc| {
                let doc_terms = tokenize(&doc.content);
                let overlap = terms.intersection(&doc_terms).count();
                if overlap == 0 {
                    return None;
                }
                Some(SearchHit {
                    document: doc.clone(),
                    score: overlap as f64 / terms.len() as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}
