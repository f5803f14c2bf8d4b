//! Conversation-bound chat agent
//!
//! Owns the conversation and agent-state caches (LRU + TTL bounded, so
//! resident memory stays bounded no matter how many chats arrive).
//! Each turn resolves or creates a conversation, appends the user
//! message, runs the workflow agent, appends the assistant reply (partial
//! replies included) and returns the result with its identifiers.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::agent::workflow_agent::WorkflowAgent;
use crate::models::agent::AgentState;
use crate::models::message::{ChatRequest, ChatResponse, Conversation};
use crate::storage::ConversationStore;
use crate::Result;
use flowgraph::LruTtlCache;

/// Chat agent binding conversations and agent state to the tool loop
pub struct ChatAgent {
    agent: Arc<WorkflowAgent>,
    conversations: LruTtlCache<String, Conversation>,
    states: LruTtlCache<String, AgentState>,
    store: Option<Arc<ConversationStore>>,
}

impl ChatAgent {
    /// Create a chat agent bounded by `max_conversations` live
    /// conversations with the given TTL
    pub fn new(agent: Arc<WorkflowAgent>, max_conversations: usize, ttl: Duration) -> Self {
        Self {
            agent,
            conversations: LruTtlCache::new(max_conversations, ttl),
            states: LruTtlCache::new(max_conversations, ttl),
            store: None,
        }
    }

    /// Persist conversations to a store on each turn
    pub fn with_store(mut self, store: Arc<ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Resolve an existing conversation or create a fresh one
    async fn resolve_conversation(&self, conversation_id: Option<&str>) -> Conversation {
        if let Some(id) = conversation_id {
            if let Some(conversation) = self.conversations.get(&id.to_string()) {
                return conversation;
            }
            // Fall back to persisted history after an eviction or restart
            if let Some(store) = &self.store {
                if let Ok(Some(conversation)) = store.load(id).await {
                    return conversation;
                }
            }
        }
        Conversation::new()
    }

    /// Look up a cached conversation
    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.get(&conversation_id.to_string())
    }

    /// Look up cached agent state
    pub fn state(&self, conversation_id: &str) -> Option<AgentState> {
        self.states.get(&conversation_id.to_string())
    }

    /// Number of cached conversations
    pub fn cached_conversations(&self) -> usize {
        self.conversations.len()
    }

    /// Purge expired conversations and states
    pub fn cleanup_expired(&self) -> usize {
        self.conversations.cleanup_expired() + self.states.cleanup_expired()
    }

    /// Process one chat turn
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut conversation = self
            .resolve_conversation(request.conversation_id.as_deref())
            .await;
        let conversation_id = conversation.id.clone();
        let history = conversation.messages.clone();
        conversation.push("user", &request.message);

        let reply = self
            .agent
            .process_message(&request.message, &history, request.prompt_id.as_deref())
            .await?;
        let message = self.reply_text(&reply);

        self.finish_turn(&mut conversation, &conversation_id, &message, &reply)
            .await;

        Ok(self.response(conversation_id, message, reply, request.prompt_id))
    }

    /// Process one chat turn with a streamed reply
    ///
    /// Chunks flow into the stream buffer under `response_id` and through
    /// `on_chunk`. The assistant message is appended even when only
    /// partial content was produced.
    pub async fn chat_stream(
        &self,
        request: ChatRequest,
        response_id: &str,
        cancel: CancellationToken,
        on_chunk: impl FnMut(&str) + Send,
    ) -> Result<ChatResponse> {
        let mut conversation = self
            .resolve_conversation(request.conversation_id.as_deref())
            .await;
        let conversation_id = conversation.id.clone();
        let history = conversation.messages.clone();
        conversation.push("user", &request.message);

        let reply = self
            .agent
            .process_message_stream(
                &request.message,
                &history,
                request.prompt_id.as_deref(),
                response_id,
                Some(conversation_id.clone()),
                cancel,
                on_chunk,
            )
            .await?;
        let message = self.reply_text(&reply);

        self.finish_turn(&mut conversation, &conversation_id, &message, &reply)
            .await;

        Ok(self.response(conversation_id, message, reply, request.prompt_id))
    }

    /// The assistant text to record; model failures surface as text so
    /// the conversation stays coherent
    fn reply_text(&self, reply: &crate::models::agent::AgentReply) -> String {
        if reply.message.is_empty() {
            if let Some(error) = reply.metadata.get("error").and_then(|v| v.as_str()) {
                return format!("Something went wrong while answering: {}", error);
            }
        }
        reply.message.clone()
    }

    async fn finish_turn(
        &self,
        conversation: &mut Conversation,
        conversation_id: &str,
        message: &str,
        reply: &crate::models::agent::AgentReply,
    ) {
        conversation.push("assistant", message);

        let mut state = self
            .states
            .get(&conversation_id.to_string())
            .unwrap_or_else(|| AgentState::new(conversation_id));
        if reply.workflow_triggered {
            if let Some(workflow_id) = &reply.workflow_id {
                state.record_workflow(workflow_id.clone());
            }
        }
        state.tool_calls.extend(reply.tool_calls.iter().cloned());
        state.updated_at = chrono::Utc::now();
        self.states.insert(conversation_id.to_string(), state);

        if let Some(store) = &self.store {
            if let Err(err) = store.save(conversation).await {
                tracing::warn!(conversation_id, "conversation persist failed: {}", err);
            }
        }
        self.conversations
            .insert(conversation_id.to_string(), conversation.clone());
    }

    fn response(
        &self,
        conversation_id: String,
        message: String,
        reply: crate::models::agent::AgentReply,
        prompt_id: Option<String>,
    ) -> ChatResponse {
        let mut metadata = reply.metadata;
        if let Some(prompt_id) = prompt_id {
            metadata.insert("prompt_id".to_string(), json!(prompt_id));
        }
        ChatResponse {
            response: message,
            conversation_id,
            workflow_id: reply.workflow_id,
            workflow_status: reply.workflow_status,
            tool_calls: reply.tool_calls,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{ResponseHandler, StreamRegistry};
    use flowgraph::ToolRegistry;
    use llm::MockChatModel;

    fn chat_agent(model: &MockChatModel) -> ChatAgent {
        let registry = Arc::new(StreamRegistry::new());
        let handler = Arc::new(ResponseHandler::new(registry));
        let agent = Arc::new(WorkflowAgent::new(
            Arc::new(model.clone()),
            Arc::new(ToolRegistry::new()),
            handler,
        ));
        ChatAgent::new(agent, 100, Duration::from_secs(3600))
    }

    fn request(message: &str, conversation_id: Option<String>) -> ChatRequest {
        serde_json::from_value(json!({
            "message": message,
            "conversation_id": conversation_id,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_new_conversation_created() {
        let model = MockChatModel::new();
        model.push_text("hello!");
        let agent = chat_agent(&model);

        let response = agent.chat(request("hi", None)).await.unwrap();
        assert_eq!(response.response, "hello!");
        assert!(!response.conversation_id.is_empty());

        let conversation = agent.conversation(&response.conversation_id).unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, "user");
        assert_eq!(conversation.messages[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_conversation_continues() {
        let model = MockChatModel::new();
        model.push_text("first");
        model.push_text("second");
        let agent = chat_agent(&model);

        let r1 = agent.chat(request("one", None)).await.unwrap();
        let r2 = agent
            .chat(request("two", Some(r1.conversation_id.clone())))
            .await
            .unwrap();
        assert_eq!(r1.conversation_id, r2.conversation_id);

        let conversation = agent.conversation(&r2.conversation_id).unwrap();
        assert_eq!(conversation.messages.len(), 4);

        // The second model call saw the first exchange as history
        let second_request = &model.requests()[1];
        assert!(second_request
            .messages
            .iter()
            .any(|m| m.content == "first"));
    }

    #[tokio::test]
    async fn test_unknown_conversation_id_starts_fresh() {
        let model = MockChatModel::new();
        model.push_text("ok");
        let agent = chat_agent(&model);

        let response = agent
            .chat(request("hi", Some("does-not-exist".to_string())))
            .await
            .unwrap();
        assert_ne!(response.conversation_id, "does-not-exist");
    }

    #[tokio::test]
    async fn test_error_reply_recorded_as_text() {
        let model = MockChatModel::new();
        model.push_failure("provider down");
        let agent = chat_agent(&model);

        let response = agent.chat(request("hi", None)).await.unwrap();
        assert!(response.response.contains("provider down"));

        let conversation = agent.conversation(&response.conversation_id).unwrap();
        assert_eq!(conversation.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_stays_bounded() {
        let model = MockChatModel::new();
        let registry = Arc::new(StreamRegistry::new());
        let handler = Arc::new(ResponseHandler::new(registry));
        let workflow_agent = Arc::new(WorkflowAgent::new(
            Arc::new(model.clone()),
            Arc::new(ToolRegistry::new()),
            handler,
        ));
        let agent = ChatAgent::new(workflow_agent, 5, Duration::from_secs(3600));

        for i in 0..8 {
            model.push_text(format!("reply {}", i));
            agent.chat(request("hi", None)).await.unwrap();
        }
        assert!(agent.cached_conversations() <= 5);
    }

    #[tokio::test]
    async fn test_persisted_conversation_survives_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path()));
        let model = MockChatModel::new();
        model.push_text("first");
        model.push_text("second");

        let registry = Arc::new(StreamRegistry::new());
        let handler = Arc::new(ResponseHandler::new(registry));
        let workflow_agent = Arc::new(WorkflowAgent::new(
            Arc::new(model.clone()),
            Arc::new(ToolRegistry::new()),
            handler,
        ));
        let agent = ChatAgent::new(workflow_agent, 100, Duration::from_secs(3600))
            .with_store(Arc::clone(&store));

        let r1 = agent.chat(request("one", None)).await.unwrap();
        // Simulate eviction by clearing the cache through TTL cleanup
        agent.conversations.remove(&r1.conversation_id);

        let r2 = agent
            .chat(request("two", Some(r1.conversation_id.clone())))
            .await
            .unwrap();
        assert_eq!(r1.conversation_id, r2.conversation_id);
        let loaded = store.load(&r2.conversation_id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_stream_turn_appends_partial() {
        let model = MockChatModel::new();
        model.push_text("streamed reply");
        let agent = chat_agent(&model);

        let response = agent
            .chat_stream(
                request("hi", None),
                "resp-1",
                CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(response.response, "streamed reply");
        assert_eq!(response.metadata["response_id"], "resp-1");

        let conversation = agent.conversation(&response.conversation_id).unwrap();
        assert_eq!(conversation.messages[1].content, "streamed reply");
    }
}
