//! HTTP request tool

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use flowgraph::{GraphError, Result, Tool};

/// Tool issuing HTTP requests from task nodes
pub struct HttpTool {
    client: reqwest::Client,
}

impl HttpTool {
    /// Create the tool with a 30s request timeout
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpTool {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(message: impl Into<String>) -> GraphError {
    GraphError::Tool {
        tool: "http_request".to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make an HTTP request. Arguments: url (string), method (GET/POST/PUT/DELETE, default GET), headers (object, optional), body (any, optional)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "method": { "type": "string", "enum": ["GET", "POST", "PUT", "DELETE"], "default": "GET" },
                "headers": { "type": "object" },
                "body": {}
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("url is required"))?;
        let method = args
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            other => return Err(invalid(format!("unsupported method: {}", other))),
        };

        if let Some(headers) = args.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if let Some(body) = args.get("body") {
            if !body.is_null() {
                request = request.json(body);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| invalid(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| invalid(format!("reading response failed: {}", e)))?;

        // Pass JSON bodies through structurally
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({ "status": status, "body": body }))
    }
}
