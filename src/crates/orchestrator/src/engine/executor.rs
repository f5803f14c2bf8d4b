//! Node execution semantics
//!
//! `run_from` walks the graph from a node until it reaches an end node
//! (or, for loop bodies, the loop node itself), dispatching each node
//! kind. Task results that are JSON objects merge into the workflow
//! variables, which is how tasks communicate values to later nodes and
//! how parallel branches produce their writes.

use futures::future::{join_all, BoxFuture};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{OrchestratorError, Result};
use flowgraph::{expr, Node, NodeKind, NodeStatus, ToolRegistry, Workflow};

/// Walk the graph from `node_id`, stopping at an end node or at `stop_at`
/// (the enclosing loop node when executing a loop body)
pub(super) fn run_from<'a>(
    tools: &'a Arc<ToolRegistry>,
    workflow: &'a mut Workflow,
    node_id: String,
    stop_at: Option<String>,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let mut current = node_id;
        loop {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled(workflow.id.clone()));
            }
            if stop_at.as_deref() == Some(current.as_str()) {
                return Ok(());
            }

            workflow.current_node_id = Some(current.clone());
            let kind = workflow
                .node(&current)
                .map(|n| n.kind)
                .ok_or_else(|| OrchestratorError::ExecutionFailed(format!(
                    "node not found: {}",
                    current
                )))?;

            match kind {
                NodeKind::Start => {
                    mark_running(workflow, &current)?;
                    mark_completed(workflow, &current, None);
                    current = unique_next(workflow, &current)?;
                }
                NodeKind::End => {
                    mark_running(workflow, &current)?;
                    mark_completed(workflow, &current, None);
                    return Ok(());
                }
                NodeKind::Task => {
                    run_task(tools, workflow, &current, cancel).await?;
                    current = unique_next(workflow, &current)?;
                }
                NodeKind::Condition => {
                    current = run_condition(workflow, &current)?;
                }
                NodeKind::Loop => {
                    current = run_loop(tools, workflow, &current, cancel).await?;
                }
                NodeKind::Parallel => {
                    run_parallel(tools, workflow, &current, cancel).await?;
                    current = unique_next(workflow, &current)?;
                }
            }
        }
    })
}

fn mark_running(workflow: &mut Workflow, node_id: &str) -> Result<()> {
    if let Some(node) = workflow.node_mut(node_id) {
        node.transition(NodeStatus::Running)?;
    }
    Ok(())
}

fn mark_completed(workflow: &mut Workflow, node_id: &str, result: Option<Value>) {
    if let Some(node) = workflow.node_mut(node_id) {
        node.result = result;
        let _ = node.transition(NodeStatus::Completed);
    }
}

fn mark_failed(workflow: &mut Workflow, node_id: &str, error: &str) {
    if let Some(node) = workflow.node_mut(node_id) {
        node.error = Some(error.to_string());
        let _ = node.transition(NodeStatus::Failed);
    }
}

/// The single outgoing edge target of a node
fn unique_next(workflow: &Workflow, node_id: &str) -> Result<String> {
    workflow
        .outgoing(node_id)
        .first()
        .map(|e| e.target.clone())
        .ok_or_else(|| {
            OrchestratorError::ExecutionFailed(format!("node {} has no outgoing edge", node_id))
        })
}

/// Execute a task node: substitute parameters, invoke the tool, merge an
/// object result into the workflow variables
async fn run_task(
    tools: &Arc<ToolRegistry>,
    workflow: &mut Workflow,
    node_id: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(OrchestratorError::Cancelled(workflow.id.clone()));
    }
    mark_running(workflow, node_id)?;

    let node = workflow
        .node(node_id)
        .ok_or_else(|| OrchestratorError::ExecutionFailed(format!("node not found: {}", node_id)))?;
    let tool_name = node.tool_name.clone().ok_or_else(|| {
        let message = format!("task node {} has no tool", node_id);
        OrchestratorError::ExecutionFailed(message)
    })?;
    let args = substitute_params(&node.tool_params, &workflow.variables);

    tracing::debug!(node_id, tool = %tool_name, "invoking tool");
    match tools.invoke(&tool_name, args).await {
        Ok(result) => {
            merge_object(&mut workflow.variables, &result);
            mark_completed(workflow, node_id, Some(result));
            Ok(())
        }
        Err(err) => {
            let message = format!("node {} failed: {}", node_id, err);
            mark_failed(workflow, node_id, &err.to_string());
            Err(OrchestratorError::ExecutionFailed(message))
        }
    }
}

/// Route a condition node: first conditioned edge that evaluates truthy
/// wins, else the first unconditioned edge, else the node fails
fn run_condition(workflow: &mut Workflow, node_id: &str) -> Result<String> {
    mark_running(workflow, node_id)?;

    let expr_result = match workflow
        .node(node_id)
        .and_then(|n| n.condition_expr.clone())
        .map(|e| expr::evaluate(&e, &workflow.variables))
        .transpose()
    {
        Ok(value) => value,
        Err(err) => {
            mark_failed(workflow, node_id, &err.to_string());
            return Err(err.into());
        }
    };

    let edges: Vec<(Option<String>, String)> = workflow
        .outgoing(node_id)
        .iter()
        .map(|e| (e.condition.clone(), e.target.clone()))
        .collect();

    let mut chosen = None;
    for (condition, target) in &edges {
        if let Some(condition) = condition {
            match expr::evaluate_bool(condition, &workflow.variables) {
                Ok(true) => {
                    chosen = Some(target.clone());
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    mark_failed(workflow, node_id, &err.to_string());
                    return Err(err.into());
                }
            }
        }
    }
    if chosen.is_none() {
        chosen = edges
            .iter()
            .find(|(condition, _)| condition.is_none())
            .map(|(_, target)| target.clone());
    }

    match chosen {
        Some(target) => {
            let result = json!({
                "selected": target,
                "expr": expr_result,
            });
            mark_completed(workflow, node_id, Some(result));
            Ok(target)
        }
        None => {
            mark_failed(workflow, node_id, "no edge condition matched");
            Err(OrchestratorError::ExecutionFailed(format!(
                "condition node {} matched no edge",
                node_id
            )))
        }
    }
}

/// Iterate a loop node's body over its item sequence, returning the exit
/// edge target
async fn run_loop(
    tools: &Arc<ToolRegistry>,
    workflow: &mut Workflow,
    node_id: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    mark_running(workflow, node_id)?;

    let node = workflow
        .node(node_id)
        .ok_or_else(|| OrchestratorError::ExecutionFailed(format!("node not found: {}", node_id)))?;
    let loop_var = node.loop_var.clone().unwrap_or_default();
    let items_expr = node.loop_items.clone().unwrap_or_default();

    let items = match expr::evaluate(&items_expr, &workflow.variables) {
        Err(err) => {
            mark_failed(workflow, node_id, &err.to_string());
            return Err(err.into());
        }
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            let message = format!(
                "loop items expression did not yield a sequence: {}",
                other
            );
            mark_failed(workflow, node_id, &message);
            return Err(OrchestratorError::ExecutionFailed(message));
        }
    };

    let (body_target, exit_target) = workflow
        .loop_edges(node_id)
        .map(|(body, exit)| (body.target.clone(), exit.target.clone()))
        .ok_or_else(|| {
            OrchestratorError::ExecutionFailed(format!("loop node {} has no body edge", node_id))
        })?;

    // Nodes between the body entry and the back-edge re-run every iteration
    let body_nodes: Vec<String> = workflow
        .nodes
        .iter()
        .filter(|n| {
            n.id != node_id
                && workflow.reachable(&body_target, &n.id)
                && workflow.reachable(&n.id, node_id)
        })
        .map(|n| n.id.clone())
        .collect();

    let total = items.len();
    for (index, item) in items.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled(workflow.id.clone()));
        }
        tracing::debug!(node_id, iteration = index, "loop iteration");

        for body_node in &body_nodes {
            if let Some(node) = workflow.node_mut(body_node) {
                node.reset();
            }
        }
        workflow.variables.insert(loop_var.clone(), item);

        if let Err(err) = run_from(
            tools,
            workflow,
            body_target.clone(),
            Some(node_id.to_string()),
            cancel,
        )
        .await
        {
            mark_failed(workflow, node_id, &err.to_string());
            return Err(err);
        }
        // The walk stops at the loop node; keep it current for bookkeeping
        workflow.current_node_id = Some(node_id.to_string());
    }

    mark_completed(workflow, node_id, Some(json!({ "iterations": total })));
    Ok(exit_target)
}

struct BranchOutcome {
    index: usize,
    nodes: Vec<Node>,
    /// Variables written by the branch (delta against the shared base)
    writes: Map<String, Value>,
    error: Option<String>,
}

/// Fan out the branches of a parallel node and join on all of them
///
/// Each branch runs on its own copy of the variables; on join, writes are
/// merged last-writer-wins in branch index order. Any branch failure
/// fails the node.
async fn run_parallel(
    tools: &Arc<ToolRegistry>,
    workflow: &mut Workflow,
    node_id: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    mark_running(workflow, node_id)?;

    let branches = workflow
        .node(node_id)
        .and_then(|n| n.parallel_branches.clone())
        .unwrap_or_default();

    let base_variables = workflow.variables.clone();
    let mut futures = Vec::new();
    for (index, branch) in branches.iter().enumerate() {
        let nodes: Vec<Node> = branch
            .iter()
            .filter_map(|id| workflow.node(id).cloned())
            .map(|mut n| {
                n.reset();
                n
            })
            .collect();
        let tools = Arc::clone(tools);
        let variables = base_variables.clone();
        let base = base_variables.clone();
        let cancel = cancel.clone();
        futures.push(run_branch(tools, index, nodes, variables, base, cancel));
    }

    let outcomes = join_all(futures).await;

    let mut failure = None;
    for outcome in &outcomes {
        for node in &outcome.nodes {
            if let Some(target) = workflow.node_mut(&node.id) {
                *target = node.clone();
            }
        }
        if let Some(error) = &outcome.error {
            failure.get_or_insert_with(|| (outcome.index, error.clone()));
        }
    }

    if let Some((index, error)) = failure {
        let message = format!("branch {} failed: {}", index, error);
        mark_failed(workflow, node_id, &message);
        return Err(OrchestratorError::ExecutionFailed(format!(
            "parallel node {}: {}",
            node_id, message
        )));
    }

    // Last-writer-wins by branch index
    for outcome in outcomes {
        for (key, value) in outcome.writes {
            workflow.variables.insert(key, value);
        }
    }

    mark_completed(
        workflow,
        node_id,
        Some(json!({ "branches": branches.len() })),
    );
    Ok(())
}

/// Run one branch's nodes sequentially against a private variable copy
async fn run_branch(
    tools: Arc<ToolRegistry>,
    index: usize,
    mut nodes: Vec<Node>,
    mut variables: HashMap<String, Value>,
    base: HashMap<String, Value>,
    cancel: CancellationToken,
) -> BranchOutcome {
    let mut error = None;

    for node in &mut nodes {
        if cancel.is_cancelled() {
            error = Some("cancelled".to_string());
            break;
        }
        if node.kind != NodeKind::Task {
            error = Some(format!(
                "node {} is not a task; only task nodes may run in a branch",
                node.id
            ));
            break;
        }
        let Some(tool_name) = node.tool_name.clone() else {
            error = Some(format!("task node {} has no tool", node.id));
            break;
        };

        if node.transition(NodeStatus::Running).is_err() {
            error = Some(format!("node {} in illegal state", node.id));
            break;
        }
        let args = substitute_params(&node.tool_params, &variables);
        match tools.invoke(&tool_name, args).await {
            Ok(result) => {
                merge_object(&mut variables, &result);
                node.result = Some(result);
                let _ = node.transition(NodeStatus::Completed);
            }
            Err(err) => {
                node.error = Some(err.to_string());
                let _ = node.transition(NodeStatus::Failed);
                error = Some(err.to_string());
                break;
            }
        }
    }

    // Only keys the branch actually wrote participate in the join merge
    let mut writes = Map::new();
    for (key, value) in &variables {
        if base.get(key) != Some(value) {
            writes.insert(key.clone(), value.clone());
        }
    }

    BranchOutcome {
        index,
        nodes,
        writes,
        error,
    }
}

/// Merge an object result into the variables mapping
fn merge_object(variables: &mut HashMap<String, Value>, result: &Value) {
    if let Value::Object(map) = result {
        for (key, value) in map {
            variables.insert(key.clone(), value.clone());
        }
    }
}

/// Substitute `{var}` placeholders in tool parameters
///
/// A string that is exactly one placeholder takes the variable's value
/// with its type preserved; placeholders embedded in longer strings are
/// replaced with the variable's string rendering. Unknown placeholders
/// are left as-is.
pub(crate) fn substitute_params(
    params: &HashMap<String, Value>,
    variables: &HashMap<String, Value>,
) -> Value {
    let mut out = Map::new();
    for (key, value) in params {
        out.insert(key.clone(), substitute_value(value, variables));
    }
    Value::Object(out)
}

fn substitute_value(value: &Value, variables: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(name) = exact_placeholder(s) {
                if let Some(bound) = variables.get(name) {
                    return bound.clone();
                }
            }
            let mut rendered = s.clone();
            for (name, bound) in variables {
                let placeholder = format!("{{{}}}", name);
                if rendered.contains(&placeholder) {
                    rendered = rendered.replace(&placeholder, &render(bound));
                }
            }
            Value::String(rendered)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_value(v, variables))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// The inner name when the string is exactly `{name}`
fn exact_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    if !inner.is_empty() && !inner.contains(['{', '}']) {
        Some(inner)
    } else {
        None
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WorkflowEngine;
    use flowgraph::{Edge, FnTool, Workflow};

    fn registry_with(tools: Vec<FnTool>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool)).unwrap();
        }
        Arc::new(registry)
    }

    fn write_tool(name: &'static str, key: &'static str, value: Value) -> FnTool {
        FnTool::new(name, "Write a variable", move |_| {
            let value = value.clone();
            async move { Ok(json!({ key: value })) }
        })
    }

    #[test]
    fn test_substitution_preserves_types() {
        let params = HashMap::from([
            ("exact".to_string(), json!("{count}")),
            ("embedded".to_string(), json!("count is {count}")),
            ("unknown".to_string(), json!("{missing}")),
            ("nested".to_string(), json!({ "deep": "{name}" })),
        ]);
        let variables = HashMap::from([
            ("count".to_string(), json!(3)),
            ("name".to_string(), json!("flow")),
        ]);

        let args = substitute_params(&params, &variables);
        assert_eq!(args["exact"], json!(3));
        assert_eq!(args["embedded"], json!("count is 3"));
        assert_eq!(args["unknown"], json!("{missing}"));
        assert_eq!(args["nested"]["deep"], json!("flow"));
    }

    #[tokio::test]
    async fn test_conditional_branch_positive() {
        let tools = registry_with(vec![
            write_tool("write_a", "went", json!("a")),
            write_tool("write_b", "went", json!("b")),
        ]);
        let engine = WorkflowEngine::new(tools);

        let workflow = Workflow::new("wf-cond", "conditional")
            .with_node(Node::start("start"))
            .with_node(Node::condition("check", "x"))
            .with_node(Node::task("a", "write_a", HashMap::new()))
            .with_node(Node::task("b", "write_b", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "check"))
            .with_edge(Edge::new("check", "a").with_condition("x > 0"))
            .with_edge(Edge::new("check", "b"))
            .with_edge(Edge::new("a", "end"))
            .with_edge(Edge::new("b", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute(
                "wf-cond",
                HashMap::from([("x".to_string(), json!(5))]),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, NodeStatus::Completed);
        assert_eq!(result.variables["went"], json!("a"));
        assert_eq!(result.node("a").unwrap().status, NodeStatus::Completed);
        // The untaken branch never ran
        assert_eq!(result.node("b").unwrap().status, NodeStatus::Pending);

        // Negative input takes the default edge
        let result = engine
            .execute(
                "wf-cond",
                HashMap::from([("x".to_string(), json!(-1))]),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.variables["went"], json!("b"));
    }

    #[tokio::test]
    async fn test_condition_without_match_fails() {
        let tools = registry_with(vec![write_tool("noop", "k", json!(1))]);
        let engine = WorkflowEngine::new(tools);

        let workflow = Workflow::new("wf-nomatch", "no match")
            .with_node(Node::start("start"))
            .with_node(Node::condition("check", "x"))
            .with_node(Node::task("a", "noop", HashMap::new()))
            .with_node(Node::task("b", "noop", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "check"))
            .with_edge(Edge::new("check", "a").with_condition("x > 10"))
            .with_edge(Edge::new("check", "b").with_condition("x > 100"))
            .with_edge(Edge::new("a", "end"))
            .with_edge(Edge::new("b", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute(
                "wf-nomatch",
                HashMap::from([("x".to_string(), json!(1))]),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, NodeStatus::Failed);
        assert_eq!(result.node("check").unwrap().status, NodeStatus::Failed);
    }

    #[tokio::test]
    async fn test_parallel_fan_out_merges_writes() {
        let tools = registry_with(vec![
            write_tool("t1", "a", json!(1)),
            write_tool("t2", "b", json!(2)),
        ]);
        let engine = WorkflowEngine::new(tools);

        let workflow = Workflow::new("wf-par", "parallel")
            .with_node(Node::start("start"))
            .with_node(Node::parallel(
                "fan",
                vec![vec!["n1".to_string()], vec!["n2".to_string()]],
            ))
            .with_node(Node::task("n1", "t1", HashMap::new()))
            .with_node(Node::task("n2", "t2", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "fan"))
            .with_edge(Edge::new("fan", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute("wf-par", HashMap::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, NodeStatus::Completed);
        assert_eq!(result.variables["a"], json!(1));
        assert_eq!(result.variables["b"], json!(2));
        assert_eq!(result.node("n1").unwrap().status, NodeStatus::Completed);
        assert_eq!(result.node("n2").unwrap().status, NodeStatus::Completed);
    }

    #[tokio::test]
    async fn test_parallel_conflicting_writes_last_branch_wins() {
        let tools = registry_with(vec![
            write_tool("t1", "k", json!("first")),
            write_tool("t2", "k", json!("second")),
        ]);
        let engine = WorkflowEngine::new(tools);

        let workflow = Workflow::new("wf-conflict", "conflict")
            .with_node(Node::start("start"))
            .with_node(Node::parallel(
                "fan",
                vec![vec!["n1".to_string()], vec!["n2".to_string()]],
            ))
            .with_node(Node::task("n1", "t1", HashMap::new()))
            .with_node(Node::task("n2", "t2", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "fan"))
            .with_edge(Edge::new("fan", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute("wf-conflict", HashMap::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.variables["k"], json!("second"));
    }

    #[tokio::test]
    async fn test_parallel_branch_failure_fails_node() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(write_tool("ok", "a", json!(1))))
            .unwrap();
        registry
            .register(Arc::new(FnTool::new("boom", "Always fails", |_| async {
                Err(flowgraph::GraphError::Tool {
                    tool: "boom".to_string(),
                    message: "exploded".to_string(),
                })
            })))
            .unwrap();
        let engine = WorkflowEngine::new(Arc::new(registry));

        let workflow = Workflow::new("wf-parfail", "parallel failure")
            .with_node(Node::start("start"))
            .with_node(Node::parallel(
                "fan",
                vec![vec!["n1".to_string()], vec!["n2".to_string()]],
            ))
            .with_node(Node::task("n1", "ok", HashMap::new()))
            .with_node(Node::task("n2", "boom", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "fan"))
            .with_edge(Edge::new("fan", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute("wf-parfail", HashMap::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, NodeStatus::Failed);
        assert_eq!(result.node("fan").unwrap().status, NodeStatus::Failed);
        assert_eq!(result.node("n2").unwrap().status, NodeStatus::Failed);
    }

    #[tokio::test]
    async fn test_loop_iterates_body_per_item() {
        let collected = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(FnTool::new("collect", "Collect item", move |args| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(args.get("item").cloned().unwrap_or(Value::Null));
                    Ok(Value::Null)
                }
            })))
            .unwrap();
        let engine = WorkflowEngine::new(Arc::new(registry));

        let workflow = Workflow::new("wf-loop", "loop")
            .with_node(Node::start("start"))
            .with_node(Node::looped("each", "current", "items"))
            .with_node(Node::task(
                "body",
                "collect",
                HashMap::from([("item".to_string(), json!("{current}"))]),
            ))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "each"))
            .with_edge(Edge::new("each", "body"))
            .with_edge(Edge::new("body", "each"))
            .with_edge(Edge::new("each", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute(
                "wf-loop",
                HashMap::from([("items".to_string(), json!(["x", "y", "z"]))]),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.status, NodeStatus::Completed);
        assert_eq!(
            result.node("each").unwrap().result,
            Some(json!({ "iterations": 3 }))
        );
        assert_eq!(*collected.lock(), vec![json!("x"), json!("y"), json!("z")]);
    }

    #[tokio::test]
    async fn test_loop_with_non_sequence_items_fails() {
        let tools = registry_with(vec![write_tool("noop", "k", json!(1))]);
        let engine = WorkflowEngine::new(tools);

        let workflow = Workflow::new("wf-badloop", "bad loop")
            .with_node(Node::start("start"))
            .with_node(Node::looped("each", "current", "count"))
            .with_node(Node::task("body", "noop", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "each"))
            .with_edge(Edge::new("each", "body"))
            .with_edge(Edge::new("body", "each"))
            .with_edge(Edge::new("each", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute(
                "wf-badloop",
                HashMap::from([("count".to_string(), json!(3))]),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, NodeStatus::Failed);
    }

    #[tokio::test]
    async fn test_task_failure_fails_workflow() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(FnTool::new("boom", "Always fails", |_| async {
                Err(flowgraph::GraphError::Tool {
                    tool: "boom".to_string(),
                    message: "exploded".to_string(),
                })
            })))
            .unwrap();
        let engine = WorkflowEngine::new(Arc::new(registry));

        let workflow = Workflow::new("wf-fail", "failing")
            .with_node(Node::start("start"))
            .with_node(Node::task("bad", "boom", HashMap::new()))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "bad"))
            .with_edge(Edge::new("bad", "end"));
        engine.register(workflow).await.unwrap();

        let result = engine
            .execute("wf-fail", HashMap::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, NodeStatus::Failed);
        let node = result.node("bad").unwrap();
        assert_eq!(node.status, NodeStatus::Failed);
        assert!(node.error.as_deref().unwrap().contains("exploded"));
        // The end node never ran
        assert_eq!(result.node("end").unwrap().status, NodeStatus::Pending);
    }
}
