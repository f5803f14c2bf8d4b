//! Conversation persistence

use std::path::PathBuf;

use crate::models::message::Conversation;
use crate::storage::workflow_store::sanitize;
use crate::Result;

/// Stores conversations as one JSON file per conversation
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(conversation_id)))
    }

    /// Persist a conversation snapshot
    pub async fn save(&self, conversation: &Conversation) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let payload = serde_json::to_string_pretty(conversation)?;
        tokio::fs::write(self.path(&conversation.id), payload).await?;
        Ok(())
    }

    /// Load a conversation by id
    pub async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let path = self.path(conversation_id);
        if !path.exists() {
            return Ok(None);
        }
        let payload = tokio::fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&payload)?))
    }

    /// Delete a conversation
    pub async fn delete(&self, conversation_id: &str) -> Result<bool> {
        let path = self.path(conversation_id);
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

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path());

        let mut conversation = Conversation::new();
        conversation.push("user", "hello");
        conversation.push("assistant", "hi");
        store.save(&conversation).await.unwrap();

        let loaded = store.load(&conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].role, "assistant");

        assert!(store.delete(&conversation.id).await.unwrap());
        assert!(store.load(&conversation.id).await.unwrap().is_none());
    }
}
