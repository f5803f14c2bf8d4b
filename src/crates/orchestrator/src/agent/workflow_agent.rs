//! Tool-calling agent loop
//!
//! Builds a prompt from the system template plus recent conversation
//! history, lets the model call registered tools until it produces a
//! plain-text answer, and bounds the loop at a fixed iteration budget.
//! The streaming variant produces a single streamed answer through the
//! stream buffer registry so partial output survives disconnects; tool
//! calling stays on the non-streaming path.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::agent::AgentReply;
use crate::models::message::Message;
use crate::storage::PromptStore;
use crate::streaming::ResponseHandler;
use crate::{OrchestratorError, Result};
use flowgraph::ToolRegistry;
use llm::{ChatMessage, ChatModel, ChatRequest, Role, ToolDefinition};

/// Sentinel returned when the tool loop exceeds its iteration budget
pub const MAX_ITERATIONS_MESSAGE: &str = "max iterations reached";

/// Agent running the tool-calling loop against the language model
pub struct WorkflowAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    handler: Arc<ResponseHandler>,
    prompt_store: Option<Arc<PromptStore>>,
    system_prompt: Option<String>,
    max_iterations: usize,
    history_window: usize,
}

impl WorkflowAgent {
    /// Create an agent over a model, tool registry and response handler
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        handler: Arc<ResponseHandler>,
    ) -> Self {
        Self {
            model,
            tools,
            handler,
            prompt_store: None,
            system_prompt: None,
            max_iterations: 15,
            history_window: 10,
        }
    }

    /// Resolve system prompts from a prompt store
    pub fn with_prompt_store(mut self, store: Arc<PromptStore>) -> Self {
        self.prompt_store = Some(store);
        self
    }

    /// Override the built-in system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Bound the tool-calling loop
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// How many history turns are included in the prompt
    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    fn default_system_prompt(&self) -> String {
        let tool_lines: Vec<String> = self
            .tools
            .tools()
            .iter()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect();
        let tools_section = if tool_lines.is_empty() {
            "(no tools registered)".to_string()
        } else {
            tool_lines.join("\n")
        };
        format!(
            "You are an assistant that helps users run workflows and search knowledge bases.\n\
             \n\
             Available tools:\n{}\n\
             \n\
             Understand the user's intent, call tools when they are needed, and report results clearly. \
             If a request cannot be served with the available tools, say so politely.",
            tools_section
        )
    }

    async fn resolve_system_prompt(&self, prompt_id: Option<&str>) -> String {
        if let Some(store) = &self.prompt_store {
            if let Some(prompt_id) = prompt_id {
                match store.load(prompt_id).await {
                    Ok(Some(prompt)) => return prompt.render(&std::collections::HashMap::new()),
                    Ok(None) => {
                        tracing::warn!(prompt_id, "prompt not found, using default")
                    }
                    Err(err) => tracing::warn!(prompt_id, "prompt load failed: {}", err),
                }
            }
            if let Ok(Some(prompt)) = store.default_prompt().await {
                return prompt.render(&std::collections::HashMap::new());
            }
        }
        self.system_prompt
            .clone()
            .unwrap_or_else(|| self.default_system_prompt())
    }

    async fn build_messages(
        &self,
        message: &str,
        history: &[Message],
        prompt_id: Option<&str>,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(
            self.resolve_system_prompt(prompt_id).await,
        )];
        let start = history.len().saturating_sub(self.history_window);
        for turn in &history[start..] {
            let role = match turn.role.as_str() {
                "assistant" => Role::Assistant,
                "system" => Role::System,
                _ => Role::User,
            };
            messages.push(ChatMessage {
                role,
                content: turn.content.clone(),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.push(ChatMessage::user(message));
        messages
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .tools()
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Run the tool-calling loop and return the final reply
    pub async fn process_message(
        &self,
        message: &str,
        history: &[Message],
        prompt_id: Option<&str>,
    ) -> Result<AgentReply> {
        let mut messages = self.build_messages(message, history, prompt_id).await;
        let definitions = self.tool_definitions();
        let mut reply = AgentReply::default();

        for iteration in 0..self.max_iterations {
            let request = ChatRequest::new(messages.clone()).with_tools(definitions.clone());
            let response = match self.model.chat(request).await {
                Ok(response) => response,
                Err(err) => {
                    // Model failure breaks the loop; surface what we have
                    tracing::error!(iteration, "model call failed: {}", err);
                    reply
                        .metadata
                        .insert("error".to_string(), json!(err.to_string()));
                    return Ok(reply);
                }
            };

            if !response.has_tool_calls() {
                reply.message = response.content;
                return Ok(reply);
            }

            messages.push(ChatMessage::assistant_tool_calls(
                response.tool_calls.clone(),
            ));
            for call in response.tool_calls {
                tracing::info!(tool = %call.name, iteration, "agent tool call");
                let outcome = self.tools.invoke(&call.name, call.arguments.clone()).await;
                let result_value = match &outcome {
                    Ok(value) => value.clone(),
                    Err(err) => json!({ "error": err.to_string() }),
                };

                reply.tool_calls.push(json!({
                    "tool": call.name,
                    "arguments": call.arguments,
                    "result": result_value,
                }));
                self.note_workflow_trigger(&mut reply, &call.name, &call.arguments, &result_value);

                let result_text = match result_value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                messages.push(ChatMessage::tool(call.id, result_text));
            }
        }

        tracing::warn!(max_iterations = self.max_iterations, "agent loop overflow");
        reply.message = MAX_ITERATIONS_MESSAGE.to_string();
        Ok(reply)
    }

    /// Detect workflow tool usage and lift its identifiers into the reply
    fn note_workflow_trigger(
        &self,
        reply: &mut AgentReply,
        tool_name: &str,
        arguments: &Value,
        result: &Value,
    ) {
        match tool_name {
            "execute_workflow" => {
                reply.workflow_triggered = true;
                if let Some(workflow_id) = arguments.get("workflow_id").and_then(Value::as_str) {
                    reply.workflow_id = Some(workflow_id.to_string());
                }
                if let Some(status) = result.get("status").and_then(Value::as_str) {
                    reply.workflow_status = Some(status.to_string());
                }
                if let Some(task_id) = result.get("task_id").and_then(Value::as_str) {
                    reply
                        .metadata
                        .insert("task_id".to_string(), json!(task_id));
                }
            }
            "search_workflows" => {
                reply.workflow_triggered = true;
            }
            _ => {}
        }
    }

    /// Produce a single streamed answer through the stream buffer registry
    ///
    /// Chunks are appended to the buffer keyed by `response_id` (and fed to
    /// `on_chunk`) as they arrive; the assembled content is returned. On
    /// failure after retries, any partial content is returned with the
    /// `partial` metadata flag set. Tool calling is not available on the
    /// streaming path.
    pub async fn process_message_stream(
        &self,
        message: &str,
        history: &[Message],
        prompt_id: Option<&str>,
        response_id: &str,
        conversation_id: Option<String>,
        cancel: CancellationToken,
        mut on_chunk: impl FnMut(&str) + Send,
    ) -> Result<AgentReply> {
        let messages = self.build_messages(message, history, prompt_id).await;
        let mut reply = AgentReply::default();
        reply
            .metadata
            .insert("response_id".to_string(), json!(response_id));
        reply.metadata.insert("streamed".to_string(), json!(true));

        let model = Arc::clone(&self.model);
        let outcome = self
            .handler
            .process_with_retry(
                response_id,
                conversation_id,
                cancel,
                move || {
                    let model = Arc::clone(&model);
                    let request = ChatRequest::new(messages.clone());
                    async move { model.stream_chat(request).await }
                },
                |chunk| on_chunk(chunk),
            )
            .await;

        match outcome {
            Ok(buffer) => {
                reply.message = buffer.content();
                reply
                    .metadata
                    .insert("complete".to_string(), json!(buffer.complete));
                if buffer.is_partial() {
                    reply.metadata.insert("partial".to_string(), json!(true));
                    if let Some(error) = &buffer.error {
                        reply.metadata.insert("error".to_string(), json!(error));
                    }
                }
                Ok(reply)
            }
            Err(OrchestratorError::Cancelled(id)) => Err(OrchestratorError::Cancelled(id)),
            Err(err) => {
                tracing::error!(response_id, "streamed reply failed: {}", err);
                reply
                    .metadata
                    .insert("error".to_string(), json!(err.to_string()));
                reply.metadata.insert("complete".to_string(), json!(false));
                Ok(reply)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::StreamRegistry;
    use flowgraph::FnTool;
    use llm::{MockChatModel, ToolCallRequest};

    fn agent_with(
        model: &MockChatModel,
        tools: ToolRegistry,
    ) -> (WorkflowAgent, Arc<StreamRegistry>) {
        let registry = Arc::new(StreamRegistry::new());
        let handler = Arc::new(ResponseHandler::new(Arc::clone(&registry)));
        let agent = WorkflowAgent::new(Arc::new(model.clone()), Arc::new(tools), handler);
        (agent, registry)
    }

    fn fake_execute_tool() -> FnTool {
        FnTool::new("execute_workflow", "Run a workflow", |_| async {
            Ok(json!({ "task_id": "task-9", "status": "queued" }))
        })
    }

    #[tokio::test]
    async fn test_plain_text_reply() {
        let model = MockChatModel::new();
        model.push_text("hello there");
        let (agent, _) = agent_with(&model, ToolRegistry::new());

        let reply = agent.process_message("hi", &[], None).await.unwrap();
        assert_eq!(reply.message, "hello there");
        assert!(!reply.workflow_triggered);
        assert!(reply.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_tool_loop_executes_and_records() {
        let model = MockChatModel::new();
        model.push_tool_calls(vec![ToolCallRequest {
            id: "call-1".to_string(),
            name: "execute_workflow".to_string(),
            arguments: json!({ "workflow_id": "wf-1" }),
        }]);
        model.push_text("workflow submitted");

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(fake_execute_tool())).unwrap();
        let (agent, _) = agent_with(&model, tools);

        let reply = agent.process_message("run wf-1", &[], None).await.unwrap();
        assert_eq!(reply.message, "workflow submitted");
        assert!(reply.workflow_triggered);
        assert_eq!(reply.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(reply.workflow_status.as_deref(), Some("queued"));
        assert_eq!(reply.metadata["task_id"], "task-9");
        assert_eq!(reply.tool_calls.len(), 1);

        // The tool result was fed back to the model as a tool message
        let requests = model.requests();
        let last = requests.last().unwrap();
        assert!(last
            .messages
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("call-1")));
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_to_model() {
        let model = MockChatModel::new();
        model.push_tool_calls(vec![ToolCallRequest {
            id: "call-1".to_string(),
            name: "missing_tool".to_string(),
            arguments: json!({}),
        }]);
        model.push_text("could not do that");
        let (agent, _) = agent_with(&model, ToolRegistry::new());

        let reply = agent.process_message("do something", &[], None).await.unwrap();
        assert_eq!(reply.message, "could not do that");
        assert!(reply.tool_calls[0]["result"]["error"]
            .as_str()
            .unwrap()
            .contains("not registered"));
    }

    #[tokio::test]
    async fn test_iteration_budget_sentinel() {
        let model = MockChatModel::new();
        for _ in 0..3 {
            model.push_tool_calls(vec![ToolCallRequest {
                id: "call".to_string(),
                name: "execute_workflow".to_string(),
                arguments: json!({ "workflow_id": "wf-1" }),
            }]);
        }
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(fake_execute_tool())).unwrap();
        let (agent, _) = agent_with(&model, tools);
        let agent = agent.with_max_iterations(2);

        let reply = agent.process_message("loop forever", &[], None).await.unwrap();
        assert_eq!(reply.message, MAX_ITERATIONS_MESSAGE);
        assert_eq!(reply.tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_model_error_breaks_loop() {
        let model = MockChatModel::new();
        model.push_failure("provider down");
        let (agent, _) = agent_with(&model, ToolRegistry::new());

        let reply = agent.process_message("hi", &[], None).await.unwrap();
        assert!(reply.message.is_empty());
        assert!(reply.metadata["error"]
            .as_str()
            .unwrap()
            .contains("provider down"));
    }

    #[tokio::test]
    async fn test_history_window_respected() {
        let model = MockChatModel::new();
        model.push_text("ok");
        let (agent, _) = agent_with(&model, ToolRegistry::new());
        let agent = agent.with_history_window(2);

        let history: Vec<Message> = (0..6)
            .map(|i| Message::new("user", format!("m{}", i)))
            .collect();
        agent.process_message("now", &history, None).await.unwrap();

        let request = &model.requests()[0];
        // System prompt + 2 history turns + current message
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[1].content, "m4");
        assert_eq!(request.messages[2].content, "m5");
    }

    #[tokio::test]
    async fn test_streaming_collects_into_buffer() {
        let model = MockChatModel::new();
        model.push_text("streamed answer text");
        let (agent, registry) = agent_with(&model, ToolRegistry::new());

        let mut chunks = Vec::new();
        let reply = agent
            .process_message_stream(
                "hi",
                &[],
                None,
                "resp-1",
                Some("conv-1".to_string()),
                CancellationToken::new(),
                |chunk| chunks.push(chunk.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(reply.message, "streamed answer text");
        assert_eq!(reply.metadata["complete"], json!(true));
        assert!(chunks.len() > 1);

        let buffer = registry.get("resp-1").unwrap();
        assert!(buffer.complete);
        assert_eq!(buffer.conversation_id.as_deref(), Some("conv-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_retries_after_failure() {
        let model = MockChatModel::new();
        model.push_failure("first attempt dies");
        model.push_text("second attempt works");
        let (agent, _) = agent_with(&model, ToolRegistry::new());

        let reply = agent
            .process_message_stream(
                "hi",
                &[],
                None,
                "resp-2",
                None,
                CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(reply.message, "second attempt works");
    }
}
