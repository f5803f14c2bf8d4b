//! Service configuration
//!
//! Settings come from an optional TOML file (path in `CHATFLOW_CONFIG`,
//! default `config/chatflow.toml`) with environment variables layered on
//! top. Every section has working defaults so the server starts with no
//! configuration at all.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{OrchestratorError, Result};
use llm::LlmConfig;
use tooling::LoggingConfig;

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Upper bound on concurrent connections
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_pool_max() -> usize {
    10
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_max: default_pool_max(),
        }
    }
}

/// Task queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-task deadline in seconds
    #[serde(default = "default_hour")]
    pub task_timeout: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    5
}

fn default_hour() -> u64 {
    3600
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: default_max_workers(),
            task_timeout: default_hour(),
        }
    }
}

/// Workflow engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Total execution deadline in seconds
    #[serde(default = "default_hour")]
    pub timeout: u64,
    #[serde(default = "default_workflow_retries")]
    pub max_retries: u32,
}

fn default_workflow_retries() -> u32 {
    3
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            timeout: default_hour(),
            max_retries: default_workflow_retries(),
        }
    }
}

/// Cache bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
    /// Conversation TTL in seconds
    #[serde(default = "default_hour")]
    pub conversation_ttl: u64,
    #[serde(default = "default_max_vector_stores")]
    pub max_vector_stores: usize,
}

fn default_max_conversations() -> usize {
    1000
}

fn default_max_vector_stores() -> usize {
    50
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            conversation_ttl: default_hour(),
            max_vector_stores: default_max_vector_stores(),
        }
    }
}

/// WebSocket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSettings {
    /// Idle receive timeout in seconds
    #[serde(default = "default_ws_idle")]
    pub idle_timeout: u64,
}

fn default_ws_idle() -> u64 {
    300
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            idle_timeout: default_ws_idle(),
        }
    }
}

/// Storage root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String {
    "./storage".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub workflow: WorkflowSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub websocket: WebSocketSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    /// Load settings: TOML file when present, then environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let path = std::env::var("CHATFLOW_CONFIG")
            .unwrap_or_else(|_| "config/chatflow.toml".to_string());

        let mut settings = if Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)
                .map_err(|e| OrchestratorError::Internal(format!("bad config file: {}", e)))?
        } else {
            Settings::default()
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Layer recognized environment variables over the current values
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("CHATFLOW_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("CHATFLOW_PORT") {
            self.server.port = port;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Ok(model) = std::env::var("CHATFLOW_MODEL") {
            self.llm.model = model;
        }
        if let Ok(base_url) = std::env::var("CHATFLOW_LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(enabled) = env_parse("CHATFLOW_QUEUE_ENABLED") {
            self.queue.enabled = enabled;
        }
        if let Some(max_workers) = env_parse("CHATFLOW_MAX_WORKERS") {
            self.queue.max_workers = max_workers;
        }
        if let Ok(level) = std::env::var("CHATFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(dir) = std::env::var("CHATFLOW_LOG_DIR") {
            self.logging.dir = dir;
        }
        if let Ok(dir) = std::env::var("CHATFLOW_STORAGE_DIR") {
            self.storage.dir = dir;
        }
    }

    /// Storage subdirectory for a resource kind
    pub fn storage_path(&self, kind: &str) -> std::path::PathBuf {
        Path::new(&self.storage.dir).join(kind)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.redis.url, "redis://localhost:6379/0");
        assert_eq!(settings.redis.pool_max, 10);
        assert_eq!(settings.queue.max_workers, 5);
        assert_eq!(settings.cache.max_conversations, 1000);
        assert_eq!(settings.cache.conversation_ttl, 3600);
        assert_eq!(settings.cache.max_vector_stores, 50);
        assert_eq!(settings.websocket.idle_timeout, 300);
        assert!(settings.queue.enabled);
    }

    #[test]
    fn test_toml_overrides() {
        let raw = r#"
            [server]
            port = 9001

            [queue]
            enabled = false
            max_workers = 2

            [llm]
            api_key = "k"
            model = "gpt-4o-mini"
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.server.port, 9001);
        assert!(!settings.queue.enabled);
        assert_eq!(settings.queue.max_workers, 2);
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        // Untouched sections keep defaults
        assert_eq!(settings.cache.max_conversations, 1000);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("CHATFLOW_PORT", "9100");
        std::env::set_var("CHATFLOW_MAX_WORKERS", "7");
        let mut settings = Settings::default();
        settings.apply_env();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.queue.max_workers, 7);
        std::env::remove_var("CHATFLOW_PORT");
        std::env::remove_var("CHATFLOW_MAX_WORKERS");
    }

    #[test]
    fn test_storage_paths() {
        let settings = Settings::default();
        assert_eq!(
            settings.storage_path("workflows"),
            Path::new("./storage/workflows")
        );
    }
}
