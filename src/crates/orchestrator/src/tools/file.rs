//! Rooted file access tool
//!
//! All paths resolve under a configured root directory; traversal outside
//! the root is rejected.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};

use flowgraph::{GraphError, Result, Tool};

/// Tool for reading and writing files under a root directory
pub struct FileTool {
    root: PathBuf,
}

impl FileTool {
    /// Create the tool rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative path inside the root, rejecting escapes
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Err(invalid("absolute paths are not allowed"));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(invalid("path may not leave the file root")),
            }
        }
        Ok(self.root.join(candidate))
    }
}

fn invalid(message: impl Into<String>) -> GraphError {
    GraphError::Tool {
        tool: "file".to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl Tool for FileTool {
    fn name(&self) -> &str {
        "file"
    }

    fn description(&self) -> &str {
        "Read, write or list files under the workspace directory. Arguments: action (read/write/append/list), path (string), content (string, for writes)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["read", "write", "append", "list"] },
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["action", "path"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("action is required"))?;
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("path is required"))?;
        let resolved = self.resolve(path)?;

        match action {
            "read" => {
                let content = tokio::fs::read_to_string(&resolved)
                    .await
                    .map_err(|e| invalid(format!("read failed: {}", e)))?;
                Ok(json!({ "path": path, "content": content }))
            }
            "write" | "append" => {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("content is required for writes"))?;
                if let Some(parent) = resolved.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| invalid(format!("mkdir failed: {}", e)))?;
                }
                let payload = if action == "append" && resolved.exists() {
                    let existing = tokio::fs::read_to_string(&resolved)
                        .await
                        .map_err(|e| invalid(format!("read failed: {}", e)))?;
                    format!("{}{}", existing, content)
                } else {
                    content.to_string()
                };
                tokio::fs::write(&resolved, payload)
                    .await
                    .map_err(|e| invalid(format!("write failed: {}", e)))?;
                Ok(json!({ "path": path, "written": content.len() }))
            }
            "list" => {
                let mut names = Vec::new();
                let mut entries = tokio::fs::read_dir(&resolved)
                    .await
                    .map_err(|e| invalid(format!("list failed: {}", e)))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| invalid(format!("list failed: {}", e)))?
                {
                    names.push(entry.file_name().to_string_lossy().to_string());
                }
                names.sort();
                Ok(json!({ "path": path, "entries": names }))
            }
            other => Err(invalid(format!("unsupported action: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileTool::new(dir.path());

        tool.invoke(json!({"action": "write", "path": "notes/a.txt", "content": "hello"}))
            .await
            .unwrap();
        let read = tool
            .invoke(json!({"action": "read", "path": "notes/a.txt"}))
            .await
            .unwrap();
        assert_eq!(read["content"], "hello");
    }

    #[tokio::test]
    async fn test_append() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileTool::new(dir.path());

        tool.invoke(json!({"action": "write", "path": "log.txt", "content": "a"}))
            .await
            .unwrap();
        tool.invoke(json!({"action": "append", "path": "log.txt", "content": "b"}))
            .await
            .unwrap();
        let read = tool
            .invoke(json!({"action": "read", "path": "log.txt"}))
            .await
            .unwrap();
        assert_eq!(read["content"], "ab");
    }

    #[tokio::test]
    async fn test_list() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileTool::new(dir.path());
        tool.invoke(json!({"action": "write", "path": "b.txt", "content": ""}))
            .await
            .unwrap();
        tool.invoke(json!({"action": "write", "path": "a.txt", "content": ""}))
            .await
            .unwrap();

        let listing = tool
            .invoke(json!({"action": "list", "path": "."}))
            .await
            .unwrap();
        assert_eq!(listing["entries"], json!(["a.txt", "b.txt"]));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileTool::new(dir.path());

        let err = tool
            .invoke(json!({"action": "read", "path": "../outside.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("leave the file root"));

        let err = tool
            .invoke(json!({"action": "read", "path": "/etc/passwd"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("absolute paths"));
    }
}
