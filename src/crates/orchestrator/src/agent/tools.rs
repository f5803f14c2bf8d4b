//! Core tool surface exposed to the agent
//!
//! These tools let the model discover and trigger workflows and query
//! knowledge bases. Workflow execution prefers explicit queue submission
//! (returning a task handle) when a queue is configured; otherwise it
//! runs inline, or detached when the caller asks for `background`.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::context;
use crate::engine::WorkflowEngine;
use crate::models::task::{Task, TaskKind};
use crate::queue::TaskQueue;
use crate::storage::{KnowledgeStore, SearchProvider};
use flowgraph::{FnTool, GraphError, ToolRegistry};

fn tool_error(tool: &str, err: impl std::fmt::Display) -> GraphError {
    GraphError::Tool {
        tool: tool.to_string(),
        message: err.to_string(),
    }
}

/// Register the core tool surface into a registry
pub fn register_core_tools(
    registry: &mut ToolRegistry,
    engine: Arc<WorkflowEngine>,
    queue: Option<Arc<TaskQueue>>,
    knowledge: Option<Arc<KnowledgeStore>>,
) -> flowgraph::Result<()> {
    registry.register(Arc::new(search_workflows_tool(Arc::clone(&engine))))?;
    registry.register(Arc::new(execute_workflow_tool(engine, queue)))?;
    if let Some(knowledge) = knowledge {
        registry.register(Arc::new(search_knowledge_base_tool(Arc::clone(&knowledge))))?;
        registry.register(Arc::new(list_knowledge_bases_tool(knowledge)))?;
    }
    Ok(())
}

/// `search_workflows(keyword)` - text listing of matching workflows
pub fn search_workflows_tool(engine: Arc<WorkflowEngine>) -> FnTool {
    FnTool::new(
        "search_workflows",
        "Search available workflows by keyword. Arguments: keyword (string).",
        move |args| {
            let engine = Arc::clone(&engine);
            async move {
                let keyword = args
                    .get("keyword")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let matches = engine.search(keyword);
                if matches.is_empty() {
                    return Ok(json!(format!("No workflows match '{}'", keyword)));
                }
                let listing: Vec<String> = matches
                    .iter()
                    .map(|wf| {
                        format!(
                            "- {} (id: {}): {}",
                            wf.name,
                            wf.id,
                            wf.description.as_deref().unwrap_or("no description")
                        )
                    })
                    .collect();
                Ok(json!(listing.join("\n")))
            }
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "keyword": { "type": "string", "description": "Search keyword" }
        },
        "required": ["keyword"]
    }))
}

/// `execute_workflow(workflow_id, variables?, background?)`
///
/// With a queue configured the workflow is submitted as a task and a
/// `{task_id, status: "queued"}` handle is returned. Without a queue the
/// run happens inline, or detached (`{run_id, status: "started"}`) when
/// `background` is set.
pub fn execute_workflow_tool(
    engine: Arc<WorkflowEngine>,
    queue: Option<Arc<TaskQueue>>,
) -> FnTool {
    FnTool::new(
        "execute_workflow",
        "Execute a workflow by id. Arguments: workflow_id (string), variables (object, optional), background (boolean, optional).",
        move |args| {
            let engine = Arc::clone(&engine);
            let queue = queue.clone();
            async move {
                let workflow_id = args
                    .get("workflow_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| tool_error("execute_workflow", "workflow_id is required"))?
                    .to_string();
                let variables = parse_variables(args.get("variables"));
                let background = args
                    .get("background")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);

                if engine.get(&workflow_id).is_none() {
                    return Ok(json!(format!("Workflow not found: {}", workflow_id)));
                }

                if let Some(queue) = queue {
                    let mut task = Task::new(TaskKind::WorkflowExecute)
                        .with_param("workflow_id", json!(workflow_id))
                        .with_param("variables", json!(variables));
                    if let Some(trace_id) = context::current_trace_id() {
                        task = task.with_metadata("trace_id", json!(trace_id));
                    }
                    let task_id = queue
                        .enqueue(task)
                        .await
                        .map_err(|e| tool_error("execute_workflow", e))?;
                    return Ok(json!({
                        "task_id": task_id,
                        "status": "queued",
                        "workflow_id": workflow_id,
                    }));
                }

                if background {
                    let run_id = engine
                        .spawn_execute(&workflow_id, variables, CancellationToken::new())
                        .map_err(|e| tool_error("execute_workflow", e))?;
                    return Ok(json!({
                        "run_id": run_id,
                        "status": "started",
                        "workflow_id": workflow_id,
                    }));
                }

                let result = engine
                    .execute(&workflow_id, variables, CancellationToken::new())
                    .await
                    .map_err(|e| tool_error("execute_workflow", e))?;
                Ok(json!({
                    "workflow_id": result.id,
                    "status": result.status.to_string(),
                    "variables": result.variables,
                }))
            }
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "workflow_id": { "type": "string", "description": "Workflow id" },
            "variables": { "type": "object", "description": "Workflow variables" },
            "background": { "type": "boolean", "description": "Run detached without waiting" }
        },
        "required": ["workflow_id"]
    }))
}

/// `search_knowledge_base(query, knowledge_base_id, top_k?)`
pub fn search_knowledge_base_tool(store: Arc<KnowledgeStore>) -> FnTool {
    FnTool::new(
        "search_knowledge_base",
        "Retrieve relevant passages from a knowledge base. Arguments: query (string), knowledge_base_id (string), top_k (integer, default 5).",
        move |args| {
            let store = Arc::clone(&store);
            async move {
                let query = args
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| tool_error("search_knowledge_base", "query is required"))?;
                let kb_id = args
                    .get("knowledge_base_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        tool_error("search_knowledge_base", "knowledge_base_id is required")
                    })?;
                let top_k = args.get("top_k").and_then(Value::as_u64).unwrap_or(5) as usize;

                let hits = store
                    .search(kb_id, query, top_k)
                    .await
                    .map_err(|e| tool_error("search_knowledge_base", e))?;
                if hits.is_empty() {
                    return Ok(json!("No matching passages found"));
                }
                Ok(json!(hits
                    .iter()
                    .map(|hit| json!({
                        "content": hit.document.content,
                        "score": hit.score,
                    }))
                    .collect::<Vec<_>>()))
            }
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "knowledge_base_id": { "type": "string" },
            "top_k": { "type": "integer", "default": 5 }
        },
        "required": ["query", "knowledge_base_id"]
    }))
}

/// `list_knowledge_bases()`
pub fn list_knowledge_bases_tool(store: Arc<KnowledgeStore>) -> FnTool {
    FnTool::new(
        "list_knowledge_bases",
        "List all available knowledge bases.",
        move |_args| {
            let store = Arc::clone(&store);
            async move {
                let bases = store
                    .list()
                    .await
                    .map_err(|e| tool_error("list_knowledge_bases", e))?;
                Ok(json!(bases
                    .iter()
                    .map(|base| json!({
                        "id": base.id,
                        "name": base.name,
                        "description": base.description,
                        "documents": base.document_count,
                    }))
                    .collect::<Vec<_>>()))
            }
        },
    )
}

/// Accept variables as an object or a JSON-encoded string
fn parse_variables(value: Option<&Value>) -> HashMap<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        Some(Value::String(raw)) => serde_json::from_str::<HashMap<String, Value>>(raw)
            .unwrap_or_default(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph::{Edge, Node, Tool, Workflow};

    fn engine_with_echo() -> Arc<WorkflowEngine> {
        let mut tools = ToolRegistry::new();
        tools
            .register(Arc::new(FnTool::new("echo", "Echo", |args| async move {
                Ok(args.get("x").cloned().unwrap_or(Value::Null))
            })))
            .unwrap();
        Arc::new(WorkflowEngine::new(Arc::new(tools)))
    }

    fn sample_workflow(id: &str) -> Workflow {
        Workflow::new(id, "deploy pipeline")
            .with_description("builds and ships")
            .with_node(Node::start("start"))
            .with_node(Node::task(
                "run",
                "echo",
                HashMap::from([("x".to_string(), json!("{v}"))]),
            ))
            .with_node(Node::end("end"))
            .with_edge(Edge::new("start", "run"))
            .with_edge(Edge::new("run", "end"))
    }

    #[tokio::test]
    async fn test_search_workflows_listing() {
        let engine = engine_with_echo();
        engine.register(sample_workflow("wf-1")).await.unwrap();

        let tool = search_workflows_tool(Arc::clone(&engine));
        let listing = tool.invoke(json!({"keyword": "deploy"})).await.unwrap();
        let text = listing.as_str().unwrap();
        assert!(text.contains("deploy pipeline"));
        assert!(text.contains("wf-1"));

        let empty = tool.invoke(json!({"keyword": "zzz"})).await.unwrap();
        assert!(empty.as_str().unwrap().contains("No workflows match"));
    }

    #[tokio::test]
    async fn test_execute_workflow_inline() {
        let engine = engine_with_echo();
        engine.register(sample_workflow("wf-1")).await.unwrap();

        let tool = execute_workflow_tool(Arc::clone(&engine), None);
        let result = tool
            .invoke(json!({"workflow_id": "wf-1", "variables": {"v": "hi"}}))
            .await
            .unwrap();
        assert_eq!(result["status"], "completed");
        assert_eq!(result["variables"]["v"], "hi");
    }

    #[tokio::test]
    async fn test_execute_workflow_accepts_string_variables() {
        let engine = engine_with_echo();
        engine.register(sample_workflow("wf-1")).await.unwrap();

        let tool = execute_workflow_tool(Arc::clone(&engine), None);
        let result = tool
            .invoke(json!({"workflow_id": "wf-1", "variables": "{\"v\": \"enc\"}"}))
            .await
            .unwrap();
        assert_eq!(result["variables"]["v"], "enc");
    }

    #[tokio::test]
    async fn test_execute_unknown_workflow_reports_text() {
        let engine = engine_with_echo();
        let tool = execute_workflow_tool(engine, None);
        let result = tool.invoke(json!({"workflow_id": "nope"})).await.unwrap();
        assert!(result.as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_knowledge_tools() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::new(dir.path(), 10));
        let base = store.create("docs", None).await.unwrap();
        store
            .add_documents(&base.id, vec![crate::storage::Document::new("ownership rules")])
            .await
            .unwrap();

        let list_tool = list_knowledge_bases_tool(Arc::clone(&store));
        let bases = list_tool.invoke(json!({})).await.unwrap();
        assert_eq!(bases[0]["name"], "docs");

        let search_tool = search_knowledge_base_tool(store);
        let hits = search_tool
            .invoke(json!({"query": "ownership", "knowledge_base_id": base.id}))
            .await
            .unwrap();
        assert_eq!(hits[0]["content"], "ownership rules");
    }

    #[tokio::test]
    async fn test_register_core_tools() {
        let engine = engine_with_echo();
        let mut registry = ToolRegistry::new();
        register_core_tools(&mut registry, engine, None, None).unwrap();
        assert_eq!(
            registry.names(),
            vec!["execute_workflow", "search_workflows"]
        );
    }
}
