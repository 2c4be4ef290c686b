//! Process-local conversation store.

use super::{ConversationStore, ConversationSummary, Turn};
use docent_core::AppResult;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Conversation history kept in memory, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<Turn>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryConversationStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn append(&self, conversation_id: &str, turns: Vec<Turn>) -> AppResult<()> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .extend(turns);
        Ok(())
    }

    async fn turns(&self, conversation_id: &str) -> AppResult<Vec<Turn>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn turn_count(&self, conversation_id: &str) -> AppResult<usize> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).map_or(0, Vec::len))
    }

    async fn list(&self) -> AppResult<Vec<ConversationSummary>> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .iter()
            .filter_map(|(id, turns)| {
                turns.last().map(|last| ConversationSummary {
                    id: id.clone(),
                    turn_count: turns.len(),
                    last_activity: last.timestamp,
                })
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }
}
