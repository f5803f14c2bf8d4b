//! Prompt template storage
//!
//! Templates are rendered with `{var}` substitution; one template can be
//! flagged as the default system prompt for the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::storage::workflow_store::sanitize;
use crate::Result;

/// A reusable prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template id
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template body with `{var}` placeholders
    pub content: String,
    /// Declared placeholder names
    #[serde(default)]
    pub variables: Vec<String>,
    /// Use this template when no prompt id is supplied
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl PromptTemplate {
    /// Create a template with a fresh id
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            content: content.into(),
            variables: Vec::new(),
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Render the template, replacing `{var}` placeholders
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        let mut rendered = self.content.clone();
        for (name, value) in variables {
            rendered = rendered.replace(&format!("{{{}}}", name), value);
        }
        rendered
    }
}

/// Stores prompt templates as one JSON file per template
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, prompt_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(prompt_id)))
    }

    /// Persist a template
    pub async fn save(&self, prompt: &PromptTemplate) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let payload = serde_json::to_string_pretty(prompt)?;
        tokio::fs::write(self.path(&prompt.id), payload).await?;
        Ok(())
    }

    /// Load a template by id
    pub async fn load(&self, prompt_id: &str) -> Result<Option<PromptTemplate>> {
        let path = self.path(prompt_id);
        if !path.exists() {
            return Ok(None);
        }
        let payload = tokio::fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&payload)?))
    }

    /// All templates, sorted by name
    pub async fn list(&self) -> Result<Vec<PromptTemplate>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut prompts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(payload) = tokio::fs::read_to_string(&path).await {
                    match serde_json::from_str(&payload) {
                        Ok(prompt) => prompts.push(prompt),
                        Err(err) => {
                            tracing::warn!(path = %path.display(), "skipping unreadable prompt: {}", err)
                        }
                    }
                }
            }
        }
        prompts.sort_by(|a: &PromptTemplate, b: &PromptTemplate| a.name.cmp(&b.name));
        Ok(prompts)
    }

    /// The template flagged as default, if any
    pub async fn default_prompt(&self) -> Result<Option<PromptTemplate>> {
        Ok(self.list().await?.into_iter().find(|p| p.is_default))
    }

    /// Delete a template
    pub async fn delete(&self, prompt_id: &str) -> Result<bool> {
        let path = self.path(prompt_id);
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(path).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let template = PromptTemplate::new("greeting", "Hello {name}, welcome to {place}.");
        let rendered = template.render(&HashMap::from([
            ("name".to_string(), "Ada".to_string()),
            ("place".to_string(), "chatflow".to_string()),
        ]));
        assert_eq!(rendered, "Hello Ada, welcome to chatflow.");

        // Unknown placeholders stay literal
        let rendered = template.render(&HashMap::new());
        assert_eq!(rendered, "Hello {name}, welcome to {place}.");
    }

    #[tokio::test]
    async fn test_store_round_trip_and_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path());

        let mut assistant = PromptTemplate::new("assistant", "You are helpful.");
        assistant.is_default = true;
        let summarizer = PromptTemplate::new("summarizer", "Summarize: {text}");

        store.save(&assistant).await.unwrap();
        store.save(&summarizer).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
        let default = store.default_prompt().await.unwrap().unwrap();
        assert_eq!(default.name, "assistant");

        assert!(store.delete(&assistant.id).await.unwrap());
        assert!(store.default_prompt().await.unwrap().is_none());
    }
}
