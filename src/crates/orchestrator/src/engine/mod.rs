//! Workflow execution engine
//!
//! Registers validated workflow graphs and drives them node by node. Each
//! run executes on a private copy of the graph; the final snapshot
//! (statuses, results, variables) is written back so reads reflect the
//! last run. Duplicate registrations are rejected; re-registering requires
//! a new workflow id.

mod executor;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::storage::WorkflowStore;
use crate::{OrchestratorError, Result};
use flowgraph::{NodeStatus, ToolRegistry, Workflow};

/// Interprets workflow graphs against the tool registry
pub struct WorkflowEngine {
    workflows: RwLock<HashMap<String, Workflow>>,
    tools: Arc<ToolRegistry>,
    workflow_timeout: Duration,
    store: Option<Arc<WorkflowStore>>,
    /// Detached runs keyed by run id, cleared on completion
    tracked: DashMap<String, tokio::task::JoinHandle<()>>,
}

impl WorkflowEngine {
    /// Create an engine over the given tool registry
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            tools,
            workflow_timeout: Duration::from_secs(3600),
            store: None,
            tracked: DashMap::new(),
        }
    }

    /// Bound total execution time per run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.workflow_timeout = timeout;
        self
    }

    /// Persist registrations to (and load them from) a workflow store
    pub fn with_store(mut self, store: Arc<WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The tool registry runs dispatch through
    pub fn tools(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.tools)
    }

    /// Load previously persisted workflows from the store
    pub async fn load_persisted(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let workflows = store.load_all().await?;
        let count = workflows.len();
        let mut registry = self.workflows.write();
        for workflow in workflows {
            registry.entry(workflow.id.clone()).or_insert(workflow);
        }
        tracing::info!(count, "loaded persisted workflows");
        Ok(count)
    }

    /// Register a workflow after validating its structural invariants
    ///
    /// Fails with `Conflict` when the id is already registered.
    pub async fn register(&self, workflow: Workflow) -> Result<()> {
        workflow.validate()?;

        {
            let mut registry = self.workflows.write();
            if registry.contains_key(&workflow.id) {
                return Err(OrchestratorError::Conflict(format!(
                    "workflow already registered: {}",
                    workflow.id
                )));
            }
            registry.insert(workflow.id.clone(), workflow.clone());
        }

        if let Some(store) = &self.store {
            store.save(&workflow).await?;
        }
        tracing::info!(workflow_id = %workflow.id, name = %workflow.name, "workflow registered");
        Ok(())
    }

    /// Remove a workflow registration
    pub async fn unregister(&self, workflow_id: &str) -> Result<bool> {
        let removed = self.workflows.write().remove(workflow_id).is_some();
        if removed {
            if let Some(store) = &self.store {
                store.delete(workflow_id).await?;
            }
        }
        Ok(removed)
    }

    /// Snapshot of a registered workflow
    pub fn get(&self, workflow_id: &str) -> Option<Workflow> {
        self.workflows.read().get(workflow_id).cloned()
    }

    /// All registered workflows, sorted by name
    pub fn list(&self) -> Vec<Workflow> {
        let mut workflows: Vec<_> = self.workflows.read().values().cloned().collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        workflows
    }

    /// Case-insensitive substring search over name and description
    pub fn search(&self, keyword: &str) -> Vec<Workflow> {
        let needle = keyword.to_lowercase();
        let mut matches: Vec<_> = self
            .workflows
            .read()
            .values()
            .filter(|wf| {
                wf.name.to_lowercase().contains(&needle)
                    || wf
                        .description
                        .as_ref()
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches
    }

    /// Execute a workflow to completion
    ///
    /// Runs on a private copy of the graph with `variables` merged in. The
    /// returned workflow carries the outcome: `Completed`, or `Failed`
    /// with node-level errors (including the `"timeout"` reason when the
    /// engine deadline elapsed). The cancellation token is honored at
    /// every node boundary; cancellation surfaces as an error.
    pub async fn execute(
        &self,
        workflow_id: &str,
        variables: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<Workflow> {
        let mut workflow = self
            .get(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;

        workflow.reset_execution();
        workflow.variables.extend(variables);
        workflow.status = NodeStatus::Running;
        workflow.started_at = Some(chrono::Utc::now());
        tracing::info!(workflow_id, "workflow execution started");

        let start_id = workflow
            .start_node()
            .map(|n| n.id.clone())
            .ok_or_else(|| OrchestratorError::ExecutionFailed("missing start node".into()))?;

        let outcome = tooling::with_timeout(
            "workflow",
            self.workflow_timeout,
            executor::run_from(&self.tools, &mut workflow, start_id, None, &cancel),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                workflow.status = NodeStatus::Completed;
                workflow.completed_at = Some(chrono::Utc::now());
                tracing::info!(workflow_id, "workflow completed");
            }
            Ok(Err(OrchestratorError::Cancelled(reason))) => {
                workflow.status = NodeStatus::Failed;
                workflow.completed_at = Some(chrono::Utc::now());
                self.store_snapshot(&workflow);
                tracing::warn!(workflow_id, "workflow cancelled");
                return Err(OrchestratorError::Cancelled(reason));
            }
            Ok(Err(err)) => {
                workflow.status = NodeStatus::Failed;
                workflow.completed_at = Some(chrono::Utc::now());
                tracing::error!(workflow_id, "workflow failed: {}", err);
            }
            Err(_) => {
                // Deadline elapsed; fail the in-flight node with the reason
                if let Some(current) = workflow.current_node_id.clone() {
                    if let Some(node) = workflow.node_mut(&current) {
                        if node.status == NodeStatus::Running {
                            node.status = NodeStatus::Failed;
                            node.error = Some("timeout".to_string());
                            node.finished_at = Some(chrono::Utc::now());
                        }
                    }
                }
                workflow.status = NodeStatus::Failed;
                workflow.completed_at = Some(chrono::Utc::now());
                tracing::error!(workflow_id, "workflow timed out");
            }
        }

        self.store_snapshot(&workflow);
        Ok(workflow)
    }

    /// Submit a run without awaiting it
    ///
    /// The run is tracked by id in an internal map that is cleared when
    /// the run finishes; the returned run id can be used purely as a
    /// handle in logs.
    pub fn spawn_execute(
        self: &Arc<Self>,
        workflow_id: &str,
        variables: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<String> {
        if self.get(workflow_id).is_none() {
            return Err(OrchestratorError::WorkflowNotFound(workflow_id.to_string()));
        }

        let run_id = Uuid::new_v4().to_string();
        let engine = Arc::clone(self);
        let workflow_id = workflow_id.to_string();
        let tracked_id = run_id.clone();

        let handle = tokio::spawn({
            let run_id = run_id.clone();
            async move {
                if let Err(err) = engine.execute(&workflow_id, variables, cancel).await {
                    tracing::error!(run_id = %run_id, workflow_id = %workflow_id, "detached run failed: {}", err);
                }
                engine.tracked.remove(&run_id);
            }
        });
        self.tracked.insert(tracked_id.clone(), handle);
        // The run may have finished before the insert landed
        if self
            .tracked
            .get(&tracked_id)
            .map(|h| h.is_finished())
            .unwrap_or(false)
        {
            self.tracked.remove(&tracked_id);
        }
        Ok(run_id)
    }

    /// Number of detached runs still in flight
    pub fn tracked_runs(&self) -> usize {
        self.tracked.len()
    }

    /// Write the executed snapshot back so reads see the last run
    fn store_snapshot(&self, workflow: &Workflow) {
        if let Some(stored) = self.workflows.write().get_mut(&workflow.id) {
            *stored = workflow.clone();
        }
    }
}
