//! Language model client configuration

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};

/// Configuration for an OpenAI-compatible chat-completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Base URL of the API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum retries for failed calls
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between retries in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Streaming response deadline in seconds
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout: u64,
    /// Keep partial streamed content when a stream is interrupted
    #[serde(default = "default_true")]
    pub save_partial: bool,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_stream_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            stream_timeout: default_stream_timeout(),
            save_partial: true,
        }
    }
}

impl LlmConfig {
    /// Create a configuration with an explicit key and model
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Load the API key from the given environment variable
    pub fn from_env(key_var: &str) -> Result<Self> {
        let api_key = std::env::var(key_var)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(key_var.to_string()))?;
        Ok(Self {
            api_key,
            ..Default::default()
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.stream_timeout, 300);
        assert!(config.save_partial);
    }

    #[test]
    fn test_builder() {
        let config = LlmConfig::new("key", "gpt-4o")
            .with_base_url("http://localhost:8000/v1")
            .with_temperature(0.2);
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.temperature, 0.2);
    }

    #[test]
    fn test_from_env_missing() {
        let err = LlmConfig::from_env("CHATFLOW_TEST_UNSET_KEY").unwrap_err();
        assert!(err.to_string().contains("CHATFLOW_TEST_UNSET_KEY"));
    }
}
