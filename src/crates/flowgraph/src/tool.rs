//! Tool trait and registry
//!
//! Tools are named async callables with a JSON argument schema. Task nodes
//! resolve their `tool_name` here, and the agent loop binds the registered
//! schemas to the language model. The registry is append-only: tools are
//! registered at startup and the registry is then shared behind an `Arc`,
//! so lookup needs no lock.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{GraphError, Result};

/// A named capability invocable with JSON arguments
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human-readable description, surfaced to the language model
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    /// Invoke the tool
    async fn invoke(&self, args: Value) -> Result<Value>;
}

/// A tool built from an async closure
///
/// Convenient for the core tool surface and for tests:
///
/// ```rust,ignore
/// let tool = FnTool::new("echo", "Echo the input back", |args| async move {
///     Ok(args)
/// });
/// ```
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>,
}

impl FnTool {
    /// Create a tool from an async closure
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({ "type": "object", "properties": {} }),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Attach an argument schema
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        (self.handler)(args).await
    }
}

/// Name-keyed collection of tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; duplicate names are rejected
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(GraphError::Tool {
                tool: name,
                message: "already registered".to_string(),
            });
        }
        tracing::debug!(tool = %name, "registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Invoke a registered tool by name
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| GraphError::Tool {
            tool: name.to_string(),
            message: "not registered".to_string(),
        })?;
        tool.invoke(args).await
    }

    /// Names of all registered tools, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered tools
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
