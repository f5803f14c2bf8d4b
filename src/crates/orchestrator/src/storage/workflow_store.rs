//! Workflow definition persistence

use std::path::{Path, PathBuf};

use crate::{OrchestratorError, Result};
use flowgraph::Workflow;

/// Stores workflow definitions as one JSON file per workflow
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    /// Create a store rooted at `dir`; the directory is created lazily
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(workflow_id)))
    }

    /// Persist a workflow definition
    pub async fn save(&self, workflow: &Workflow) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let payload = serde_json::to_string_pretty(workflow)?;
        tokio::fs::write(self.path(&workflow.id), payload).await?;
        tracing::debug!(workflow_id = %workflow.id, "workflow persisted");
        Ok(())
    }

    /// Load one workflow by id
    pub async fn load(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        let path = self.path(workflow_id);
        if !path.exists() {
            return Ok(None);
        }
        let payload = tokio::fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&payload)?))
    }

    /// Load every persisted workflow, skipping unreadable files
    pub async fn load_all(&self) -> Result<Vec<Workflow>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut workflows = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match read_workflow(&path).await {
                    Ok(workflow) => workflows.push(workflow),
                    Err(err) => {
                        tracing::warn!(path = %path.display(), "skipping unreadable workflow: {}", err)
                    }
                }
            }
        }
        Ok(workflows)
    }

    /// Delete a persisted workflow
    pub async fn delete(&self, workflow_id: &str) -> Result<bool> {
        let path = self.path(workflow_id);
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(path).await?;
        Ok(true)
    }
}

async fn read_workflow(path: &Path) -> Result<Workflow> {
    let payload = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&payload).map_err(OrchestratorError::from)
}

/// Keep ids filesystem-safe
pub(crate) fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph::{Edge, Node};

    fn sample(id: &str) -> Workflow {
        Workflow::new(id, "sample")
            .with_node(Node::start("start"))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "end"))
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        store.save(&sample("wf-1")).await.unwrap();
        let loaded = store.load("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "wf-1");
        assert_eq!(loaded.nodes.len(), 2);

        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_all_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        store.save(&sample("wf-1")).await.unwrap();
        store.save(&sample("wf-2")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 2);

        assert!(store.delete("wf-1").await.unwrap());
        assert!(!store.delete("wf-1").await.unwrap());
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_all_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        store.save(&sample("wf-1")).await.unwrap();
        tokio::fs::write(dir.path().join("broken.json"), "not json")
            .await
            .unwrap();

        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[test]
    fn test_sanitize_ids() {
        assert_eq!(sanitize("wf/../etc"), "wf____etc");
        assert_eq!(sanitize("ok-id_1"), "ok-id_1");
    }
}
