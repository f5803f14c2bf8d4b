//! Workflow graph model
//!
//! Workflows are directed graphs of typed nodes connected by edges. A
//! workflow is immutable after registration except for its execution
//! snapshot (status, current node, variables) and the per-node execution
//! state the engine writes while driving the graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::{GraphError, Result};

/// Execution semantics of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Entry point, exactly one per workflow
    Start,
    /// Terminal node
    End,
    /// Invokes a registered tool
    Task,
    /// Routes along the first matching conditional edge
    Condition,
    /// Iterates a body subgraph over an item sequence
    Loop,
    /// Fans out branches concurrently and joins on all of them
    Parallel,
}

/// Node (and workflow) execution status
///
/// Transitions form a DAG: `Pending -> Running -> {Completed | Failed |
/// Skipped}`. A node never re-enters `Running`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// Whether the transition to `next` is legal
    pub fn can_transition(self, next: NodeStatus) -> bool {
        matches!(
            (self, next),
            (NodeStatus::Pending, NodeStatus::Running)
                | (NodeStatus::Running, NodeStatus::Completed)
                | (NodeStatus::Running, NodeStatus::Failed)
                | (NodeStatus::Running, NodeStatus::Skipped)
        )
    }

    /// Whether this status is terminal
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Directed edge between two nodes
///
/// The optional condition is only consulted when the source node is a
/// `Condition` node; the first edge (in declaration order) whose condition
/// evaluates truthy wins, falling back to the first edge with no condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Optional condition expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    /// Create an unconditional edge
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    /// Attach a condition expression
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A workflow node with kind-specific configuration and execution state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node id, unique within the workflow
    pub id: String,
    /// Display name
    pub name: String,
    /// Execution semantics
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tool to invoke (task nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool parameters; string values of the form `{var}` are substituted
    /// from workflow variables before invocation
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tool_params: HashMap<String, Value>,

    /// Condition expression (condition nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expr: Option<String>,

    /// Loop binding name (loop nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_var: Option<String>,
    /// Expression yielding the item sequence (loop nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_items: Option<String>,

    /// Branch node-id sequences (parallel nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_branches: Option<Vec<Vec<String>>>,

    /// Execution status
    #[serde(default)]
    pub status: NodeStatus,
    /// Result of the last execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When execution started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Create a node of the given kind with empty configuration
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            description: None,
            tool_name: None,
            tool_params: HashMap::new(),
            condition_expr: None,
            loop_var: None,
            loop_items: None,
            parallel_branches: None,
            status: NodeStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Create a start node
    pub fn start(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, NodeKind::Start)
    }

    /// Create an end node
    pub fn end(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, NodeKind::End)
    }

    /// Create a task node invoking `tool_name` with `tool_params`
    pub fn task(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_params: HashMap<String, Value>,
    ) -> Self {
        let id = id.into();
        let mut node = Self::new(id.clone(), id, NodeKind::Task);
        node.tool_name = Some(tool_name.into());
        node.tool_params = tool_params;
        node
    }

    /// Create a condition node
    pub fn condition(id: impl Into<String>, expr: impl Into<String>) -> Self {
        let id = id.into();
        let mut node = Self::new(id.clone(), id, NodeKind::Condition);
        node.condition_expr = Some(expr.into());
        node
    }

    /// Create a loop node binding `loop_var` over `loop_items`
    pub fn looped(
        id: impl Into<String>,
        loop_var: impl Into<String>,
        loop_items: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let mut node = Self::new(id.clone(), id, NodeKind::Loop);
        node.loop_var = Some(loop_var.into());
        node.loop_items = Some(loop_items.into());
        node
    }

    /// Create a parallel node with the given branches
    pub fn parallel(id: impl Into<String>, branches: Vec<Vec<String>>) -> Self {
        let id = id.into();
        let mut node = Self::new(id.clone(), id, NodeKind::Parallel);
        node.parallel_branches = Some(branches);
        node
    }

    /// Move the node to a new status, enforcing the transition DAG
    pub fn transition(&mut self, next: NodeStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(GraphError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        match next {
            NodeStatus::Running => self.started_at = Some(Utc::now()),
            _ => self.finished_at = Some(Utc::now()),
        }
        self.status = next;
        Ok(())
    }

    /// Reset execution state so the node can run again (loop bodies)
    pub fn reset(&mut self) {
        self.status = NodeStatus::Pending;
        self.result = None;
        self.error = None;
        self.started_at = None;
        self.finished_at = None;
    }
}

/// A workflow definition plus its execution snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow id
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Nodes, id-unique
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges in declaration order (condition tiebreak order)
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Overall execution status
    #[serde(default)]
    pub status: NodeStatus,
    /// Node currently being dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    /// Variable bindings shared across the run
    #[serde(default)]
    pub variables: HashMap<String, Value>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Workflow {
    /// Create an empty workflow
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: default_version(),
            nodes: Vec::new(),
            edges: Vec::new(),
            status: NodeStatus::Pending,
            current_node_id: None,
            variables: HashMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a node
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append an edge
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// The unique start node, if present
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Look up a node by id, mutably
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Outgoing edges of a node, in declaration order
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == id).collect()
    }

    /// Incoming edges of a node, in declaration order
    pub fn incoming(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == id).collect()
    }

    /// Whether `to` is reachable from `from` along directed edges
    pub fn reachable(&self, from: &str, to: &str) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            for edge in self.edges.iter().filter(|e| e.source == id) {
                queue.push_back(edge.target.as_str());
            }
        }
        false
    }

    /// Validate the structural invariants of the graph
    ///
    /// Checked: exactly one start node, at least one end node reachable from
    /// it, unique node ids, edges referencing known nodes, condition nodes
    /// with at least two outgoing edges (one of them conditioned), parallel
    /// branches referencing only nodes in this workflow, and the loop
    /// back-edge convention.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::Validation(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }

        let starts: Vec<_> = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .collect();
        if starts.len() != 1 {
            return Err(GraphError::Validation(format!(
                "expected exactly one start node, found {}",
                starts.len()
            )));
        }
        let start_id = &starts[0].id;

        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) {
                return Err(GraphError::Validation(format!(
                    "edge references unknown source node: {}",
                    edge.source
                )));
            }
            if !ids.contains(edge.target.as_str()) {
                return Err(GraphError::Validation(format!(
                    "edge references unknown target node: {}",
                    edge.target
                )));
            }
        }

        let end_reachable = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::End)
            .any(|n| self.reachable(start_id, &n.id));
        if !end_reachable {
            return Err(GraphError::Validation(
                "no end node reachable from start".to_string(),
            ));
        }

        for node in &self.nodes {
            match node.kind {
                NodeKind::Condition => {
                    let outgoing = self.outgoing(&node.id);
                    if outgoing.len() < 2 {
                        return Err(GraphError::Validation(format!(
                            "condition node {} needs at least two outgoing edges",
                            node.id
                        )));
                    }
                    if !outgoing.iter().any(|e| e.condition.is_some()) {
                        return Err(GraphError::Validation(format!(
                            "condition node {} has no conditioned outgoing edge",
                            node.id
                        )));
                    }
                }
                NodeKind::Parallel => {
                    let branches = node.parallel_branches.as_deref().unwrap_or_default();
                    if branches.is_empty() {
                        return Err(GraphError::Validation(format!(
                            "parallel node {} has no branches",
                            node.id
                        )));
                    }
                    for branch in branches {
                        for branch_node in branch {
                            if !ids.contains(branch_node.as_str()) {
                                return Err(GraphError::Validation(format!(
                                    "parallel node {} references unknown node {}",
                                    node.id, branch_node
                                )));
                            }
                        }
                    }
                }
                NodeKind::Loop => {
                    self.validate_loop(node)?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Loop shape: exactly one back-edge pointing at the loop node and two
    /// outgoing edges, one of which re-reaches the loop (the body edge).
    fn validate_loop(&self, node: &Node) -> Result<()> {
        if node.loop_var.is_none() || node.loop_items.is_none() {
            return Err(GraphError::Validation(format!(
                "loop node {} is missing loop_var or loop_items",
                node.id
            )));
        }
        let back_edges = self.incoming(&node.id);
        let back_count = back_edges
            .iter()
            .filter(|e| self.reachable(&node.id, &e.source))
            .count();
        if back_count != 1 {
            return Err(GraphError::Validation(format!(
                "loop node {} needs exactly one back-edge, found {}",
                node.id, back_count
            )));
        }
        let outgoing = self.outgoing(&node.id);
        if outgoing.len() != 2 {
            return Err(GraphError::Validation(format!(
                "loop node {} needs exactly two outgoing edges (body and exit), found {}",
                node.id,
                outgoing.len()
            )));
        }
        let body_count = outgoing
            .iter()
            .filter(|e| self.reachable(&e.target, &node.id))
            .count();
        if body_count != 1 {
            return Err(GraphError::Validation(format!(
                "loop node {} needs exactly one body edge that returns to it",
                node.id
            )));
        }
        Ok(())
    }

    /// The body entry edge of a loop node (the outgoing edge that cycles
    /// back), and the exit edge
    pub fn loop_edges(&self, id: &str) -> Option<(&Edge, &Edge)> {
        let outgoing = self.outgoing(id);
        let body = outgoing
            .iter()
            .find(|e| self.reachable(&e.target, id))
            .copied()?;
        let exit = outgoing
            .iter()
            .find(|e| !self.reachable(&e.target, id))
            .copied()?;
        Some((body, exit))
    }

    /// Reset all node execution state and the workflow snapshot
    pub fn reset_execution(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
        self.status = NodeStatus::Pending;
        self.current_node_id = None;
        self.started_at = None;
        self.completed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linear_workflow() -> Workflow {
        Workflow::new("wf-1", "linear")
            .with_node(Node::start("start"))
            .with_node(Node::task(
                "greet",
                "echo",
                HashMap::from([("x".to_string(), json!("{v}"))]),
            ))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "greet"))
            .with_edge(Edge::new("greet", "end"))
    }

    #[test]
    fn test_validate_linear() {
        assert!(linear_workflow().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_single_start() {
        let wf = linear_workflow().with_node(Node::start("start2"));
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("exactly one start"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let wf = linear_workflow().with_node(Node::end("end"));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_edge_target() {
        let wf = linear_workflow().with_edge(Edge::new("greet", "missing"));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_validate_requires_reachable_end() {
        let wf = Workflow::new("wf-2", "dangling")
            .with_node(Node::start("start"))
            .with_node(Node::end("end"));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_condition_node_needs_two_edges() {
        let wf = Workflow::new("wf-3", "cond")
            .with_node(Node::start("start"))
            .with_node(Node::condition("check", "x > 0"))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "check"))
            .with_edge(Edge::new("check", "end").with_condition("x > 0"));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_loop_shape_validates() {
        let wf = Workflow::new("wf-4", "loop")
            .with_node(Node::start("start"))
            .with_node(Node::looped("each", "item", "items"))
            .with_node(Node::task("body", "echo", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "each"))
            .with_edge(Edge::new("each", "body"))
            .with_edge(Edge::new("body", "each"))
            .with_edge(Edge::new("each", "end"));
        assert!(wf.validate().is_ok());

        let (body, exit) = wf.loop_edges("each").unwrap();
        assert_eq!(body.target, "body");
        assert_eq!(exit.target, "end");
    }

    #[test]
    fn test_status_transitions() {
        let mut node = Node::start("start");
        assert!(node.transition(NodeStatus::Completed).is_err());
        node.transition(NodeStatus::Running).unwrap();
        assert!(node.started_at.is_some());
        node.transition(NodeStatus::Completed).unwrap();
        assert!(node.finished_at.is_some());
        // Terminal states never go back to running
        assert!(node.transition(NodeStatus::Running).is_err());
    }

    #[test]
    fn test_traversal_helpers() {
        let wf = linear_workflow();
        assert_eq!(wf.start_node().unwrap().id, "start");
        assert_eq!(wf.outgoing("start").len(), 1);
        assert!(wf.reachable("start", "end"));
        assert!(!wf.reachable("end", "start"));
    }

    #[test]
    fn test_serde_round_trip() {
        let wf = linear_workflow();
        let json = serde_json::to_string(&wf).unwrap();
        let back: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, wf.id);
        assert_eq!(back.nodes.len(), 3);
        assert_eq!(back.node("greet").unwrap().kind, NodeKind::Task);
    }
}
