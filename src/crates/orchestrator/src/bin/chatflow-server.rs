//! chatflow server binary
//!
//! Wires the tool registry, workflow engine, task queue, worker pool,
//! agent layer and HTTP router together, then serves until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use orchestrator::agent::{tools as agent_tools, ChatAgent, WorkflowAgent};
use orchestrator::api::{create_router, AppState};
use orchestrator::config::Settings;
use orchestrator::engine::WorkflowEngine;
use orchestrator::queue::{
    ChatProcessHandler, KnowledgeSearchHandler, TaskQueue, WorkerPool, WorkflowExecuteHandler,
};
use orchestrator::storage::{ConversationStore, KnowledgeStore, PromptStore, WorkflowStore};
use orchestrator::streaming::{ResponseHandler, StreamRegistry};
use orchestrator::tools::register_builtin_tools;
use orchestrator::models::task::TaskKind;

use flowgraph::ToolRegistry;
use llm::{ChatModel, OpenAiClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let _log_guards = tooling::setup_logging(&settings.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting chatflow");

    let settings = Arc::new(settings);

    // Storage
    let workflow_store = Arc::new(WorkflowStore::new(settings.storage_path("workflows")));
    let conversation_store = Arc::new(ConversationStore::new(
        settings.storage_path("conversations"),
    ));
    let knowledge = Arc::new(KnowledgeStore::new(
        settings.storage_path("knowledge"),
        settings.cache.max_vector_stores,
    ));
    let prompts = Arc::new(PromptStore::new(settings.storage_path("prompts")));

    // Task queue
    let queue = if settings.queue.enabled {
        let queue = Arc::new(
            TaskQueue::new(settings.redis.url.clone())
                .with_max_connections(settings.redis.pool_max),
        );
        match queue.connect().await {
            Ok(()) => Some(queue),
            Err(err) => {
                tracing::warn!("task queue unavailable, async execution disabled: {}", err);
                None
            }
        }
    } else {
        None
    };

    // Workflow tool registry and engine
    let mut workflow_tools = ToolRegistry::new();
    register_builtin_tools(&mut workflow_tools, settings.storage_path("files"))?;
    let engine = Arc::new(
        WorkflowEngine::new(Arc::new(workflow_tools))
            .with_timeout(Duration::from_secs(settings.workflow.timeout))
            .with_store(Arc::clone(&workflow_store)),
    );
    engine.load_persisted().await?;

    // Streaming
    let streams = Arc::new(StreamRegistry::new());
    let handler = Arc::new(
        ResponseHandler::new(Arc::clone(&streams))
            .with_max_retries(settings.llm.max_retries)
            .with_retry_delay(Duration::from_secs_f64(settings.llm.retry_delay))
            .with_save_partial(settings.llm.save_partial),
    );

    // Agent over the model, with the core tool surface bound
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiClient::new(settings.llm.clone()));
    let mut agent_registry = ToolRegistry::new();
    agent_tools::register_core_tools(
        &mut agent_registry,
        Arc::clone(&engine),
        queue.clone(),
        Some(Arc::clone(&knowledge)),
    )?;
    let workflow_agent = Arc::new(
        WorkflowAgent::new(model, Arc::new(agent_registry), Arc::clone(&handler))
            .with_prompt_store(Arc::clone(&prompts)),
    );
    let chat = Arc::new(
        ChatAgent::new(
            Arc::clone(&workflow_agent),
            settings.cache.max_conversations,
            Duration::from_secs(settings.cache.conversation_ttl),
        )
        .with_store(Arc::clone(&conversation_store)),
    );

    // Worker pool
    let workers = if let Some(queue) = queue.clone() {
        let mut pool = WorkerPool::new(Arc::clone(&queue));
        pool.register(
            TaskKind::WorkflowExecute,
            Arc::new(WorkflowExecuteHandler::new(Arc::clone(&engine))),
        );
        pool.register(
            TaskKind::ChatProcess,
            Arc::new(ChatProcessHandler::new(Arc::clone(&chat))),
        );
        pool.register(
            TaskKind::KnowledgeSearch,
            Arc::new(KnowledgeSearchHandler::new(Arc::clone(&knowledge))),
        );
        let pool = Arc::new(pool);
        pool.start().await?;
        Some(pool)
    } else {
        None
    };

    // Periodic cache and stream buffer cleanup
    let cleanup_chat = Arc::clone(&chat);
    let cleanup_streams = Arc::clone(&streams);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let purged = cleanup_chat.cleanup_expired();
            let buffers = cleanup_streams.cleanup_older_than(Duration::from_secs(3600));
            if purged + buffers > 0 {
                tracing::debug!(purged, buffers, "cache cleanup pass");
            }
        }
    });

    let state = AppState {
        engine,
        chat,
        queue,
        streams,
        knowledge,
        prompts,
        settings: Arc::clone(&settings),
    };
    let router = create_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    if let Some(workers) = workers {
        workers.stop().await;
    }
    tracing::info!("chatflow stopped");
    Ok(())
}
