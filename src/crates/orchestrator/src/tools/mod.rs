//! Built-in workflow tools
//!
//! Tools invocable from task nodes: echo/templating, HTTP requests, rooted
//! file access and JSON data shaping. The code-runner style tools stay
//! external to this crate.

pub mod data;
pub mod file;
pub mod http;

pub use data::DataTool;
pub use file::FileTool;
pub use http::HttpTool;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use flowgraph::{Result, Tool, ToolRegistry};

/// Echo tool: returns its `x` argument, or all arguments when absent
///
/// Mostly useful for wiring checks and templating workflow variables into
/// a node result.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back. Arguments: x (any)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "x": { "description": "Value to echo" }
            }
        })
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        Ok(args.get("x").cloned().unwrap_or(args))
    }
}

/// Register the built-in tools into a registry
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    file_root: impl Into<std::path::PathBuf>,
) -> Result<()> {
    registry.register(Arc::new(EchoTool))?;
    registry.register(Arc::new(HttpTool::new()))?;
    registry.register(Arc::new(FileTool::new(file_root)))?;
    registry.register(Arc::new(DataTool))?;
    Ok(())
}
