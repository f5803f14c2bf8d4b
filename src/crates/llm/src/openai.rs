//! OpenAI-compatible chat-completion client
//!
//! Works against any endpoint speaking the `/chat/completions` wire format
//! (OpenAI, Azure-style gateways, vLLM, LM Studio and friends). Streaming
//! uses the SSE `data:` line framing with a `[DONE]` terminator.

use async_stream::try_stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::traits::ChatModel;
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, Role, TokenStream, ToolCallRequest, Usage,
};
use async_trait::async_trait;

/// Client for OpenAI-compatible chat-completion APIs
pub struct OpenAiClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client from configuration
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.stream_timeout))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(wire_message).collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "stream": stream,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut wire = json!({ "role": role, "content": message.content });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = Value::Array(
            message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect(),
        );
    }
    if let Some(ref id) = message.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }
    wire
}

#[derive(Deserialize)]
struct WireCompletion {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireChunkChoice>,
}

#[derive(Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = self.request_body(&request, false);

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs_f64(self.config.retry_delay * attempt as f64);
                tokio::time::sleep(delay).await;
            }

            match self.post(&body).await {
                Ok(response) => {
                    let completion: WireCompletion = response.json().await?;
                    let choice = completion.choices.into_iter().next().ok_or_else(|| {
                        LlmError::Stream("completion contained no choices".to_string())
                    })?;

                    let tool_calls = choice
                        .message
                        .tool_calls
                        .into_iter()
                        .map(|call| ToolCallRequest {
                            id: call.id,
                            name: call.function.name,
                            // Arguments arrive JSON-encoded; fall back to the
                            // raw string when a provider sends plain text
                            arguments: serde_json::from_str(&call.function.arguments)
                                .unwrap_or(Value::String(call.function.arguments)),
                        })
                        .collect();

                    return Ok(ChatResponse {
                        content: choice.message.content.unwrap_or_default(),
                        tool_calls,
                        finish_reason: choice.finish_reason,
                        usage: completion.usage,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        model = %self.config.model,
                        "chat completion failed: {}",
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Stream("retries exhausted".to_string())))
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream> {
        let body = self.request_body(&request, true);
        let response = self.post(&body).await?;
        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut pending = String::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(LlmError::Http)?;
                pending.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-delimited `data:` lines
                while let Some(newline) = pending.find('\n') {
                    let line = pending[..newline].trim().to_string();
                    pending.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        break 'read;
                    }
                    let parsed: WireChunk = serde_json::from_str(data)
                        .map_err(|e| LlmError::Stream(format!("malformed chunk: {}", e)))?;
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                yield content;
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDefinition;

    fn client() -> OpenAiClient {
        OpenAiClient::new(LlmConfig::new("test-key", "gpt-4"))
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OpenAiClient::new(
            LlmConfig::new("k", "m").with_base_url("http://localhost:8000/v1/"),
        );
        assert_eq!(client.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("be useful"),
            ChatMessage::user("hello"),
        ])
        .with_tools(vec![ToolDefinition {
            name: "echo".to_string(),
            description: "Echo".to_string(),
            parameters: json!({"type": "object"}),
        }]);

        let body = client().request_body(&request, true);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["function"]["name"], "echo");
    }

    #[test]
    fn test_wire_message_tool_roundtrip() {
        let msg = ChatMessage::tool("call-1", "result text");
        let wire = wire_message(&msg);
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call-1");

        let msg = ChatMessage::assistant_tool_calls(vec![ToolCallRequest {
            id: "call-2".to_string(),
            name: "lookup".to_string(),
            arguments: json!({"q": "rust"}),
        }]);
        let wire = wire_message(&msg);
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "lookup");
        // Arguments are transmitted as an encoded string
        let args: Value =
            serde_json::from_str(wire["tool_calls"][0]["function"]["arguments"].as_str().unwrap())
                .unwrap();
        assert_eq!(args["q"], "rust");
    }

    #[test]
    fn test_completion_parsing() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": { "name": "echo", "arguments": "{\"x\": 1}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let completion: WireCompletion = serde_json::from_value(raw).unwrap();
        let choice = &completion.choices[0];
        assert_eq!(choice.message.tool_calls[0].function.name, "echo");
        assert_eq!(completion.usage.as_ref().unwrap().total_tokens, 15);
    }
}
