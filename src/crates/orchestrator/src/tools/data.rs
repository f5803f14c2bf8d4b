//! JSON data shaping tool

use async_trait::async_trait;
use serde_json::{json, Value};

use flowgraph::{GraphError, Result, Tool};

/// Tool for extracting and combining JSON values inside workflows
pub struct DataTool;

fn invalid(message: impl Into<String>) -> GraphError {
    GraphError::Tool {
        tool: "data".to_string(),
        message: message.into(),
    }
}

/// Walk a dotted path (`a.b.0.c`) through a value
fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[async_trait]
impl Tool for DataTool {
    fn name(&self) -> &str {
        "data"
    }

    fn description(&self) -> &str {
        "Shape JSON data. Arguments: action (get/merge/keys/count), data (any), path (string, for get), other (object, for merge)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["get", "merge", "keys", "count"] },
                "data": {},
                "path": { "type": "string" },
                "other": { "type": "object" }
            },
            "required": ["action", "data"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("action is required"))?;
        let data = args.get("data").ok_or_else(|| invalid("data is required"))?;

        match action {
            "get" => {
                let path = args
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("path is required for get"))?;
                Ok(get_path(data, path).cloned().unwrap_or(Value::Null))
            }
            "merge" => {
                let other = args
                    .get("other")
                    .and_then(Value::as_object)
                    .ok_or_else(|| invalid("other must be an object for merge"))?;
                let mut base = data
                    .as_object()
                    .cloned()
                    .ok_or_else(|| invalid("data must be an object for merge"))?;
                for (key, value) in other {
                    base.insert(key.clone(), value.clone());
                }
                Ok(Value::Object(base))
            }
            "keys" => match data {
                Value::Object(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    Ok(json!(keys))
                }
                _ => Err(invalid("data must be an object for keys")),
            },
            "count" => match data {
                Value::Array(items) => Ok(json!(items.len())),
                Value::Object(map) => Ok(json!(map.len())),
                Value::String(s) => Ok(json!(s.len())),
                _ => Err(invalid("data must be an array, object or string for count")),
            },
            other => Err(invalid(format!("unsupported action: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_dotted_path() {
        let tool = DataTool;
        let data = json!({"user": {"addresses": [{"city": "berlin"}]}});

        let city = tool
            .invoke(json!({"action": "get", "data": data, "path": "user.addresses.0.city"}))
            .await
            .unwrap();
        assert_eq!(city, json!("berlin"));

        let missing = tool
            .invoke(json!({"action": "get", "data": {"a": 1}, "path": "b.c"}))
            .await
            .unwrap();
        assert_eq!(missing, Value::Null);
    }

    #[tokio::test]
    async fn test_merge_overwrites() {
        let tool = DataTool;
        let merged = tool
            .invoke(json!({
                "action": "merge",
                "data": {"a": 1, "b": 1},
                "other": {"b": 2, "c": 3}
            }))
            .await
            .unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[tokio::test]
    async fn test_keys_and_count() {
        let tool = DataTool;
        let keys = tool
            .invoke(json!({"action": "keys", "data": {"z": 1, "a": 2}}))
            .await
            .unwrap();
        assert_eq!(keys, json!(["a", "z"]));

        let count = tool
            .invoke(json!({"action": "count", "data": [1, 2, 3]}))
            .await
            .unwrap();
        assert_eq!(count, json!(3));
    }

    #[tokio::test]
    async fn test_type_errors() {
        let tool = DataTool;
        assert!(tool
            .invoke(json!({"action": "keys", "data": [1]}))
            .await
            .is_err());
        assert!(tool
            .invoke(json!({"action": "count", "data": true}))
            .await
            .is_err());
    }
}
