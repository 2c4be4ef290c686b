//! Conversation state: append-only turn history per conversation.
//!
//! History lives behind a [`ConversationStore`]; the [`ConversationManager`]
//! serializes access per conversation and applies the token budget.

mod memory;
mod sqlite;

pub use memory::MemoryConversationStore;
pub use sqlite::SqliteConversationStore;

use chrono::{DateTime, Utc};
use docent_core::config::{ConversationBackend, ConversationConfig};
use docent_core::{AppConfig, AppError, AppResult};
use docent_knowledge::RetrievalResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Passages the answer was grounded on (assistant turns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalResult>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            retrieval: None,
        }
    }

    pub fn assistant(text: impl Into<String>, retrieval: Option<RetrievalResult>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            retrieval,
        }
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Listing entry for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub turn_count: usize,
    pub last_activity: DateTime<Utc>,
}

/// Persistence boundary for conversation history.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Append `turns` in order, all or nothing.
    async fn append(&self, conversation_id: &str, turns: Vec<Turn>) -> AppResult<()>;

    /// Every turn of the conversation, oldest first. Unknown ids are empty.
    async fn turns(&self, conversation_id: &str) -> AppResult<Vec<Turn>>;

    async fn turn_count(&self, conversation_id: &str) -> AppResult<usize>;

    /// All conversations, most recently active first.
    async fn list(&self) -> AppResult<Vec<ConversationSummary>>;
}

/// Open the store selected by `conversation.store`.
pub fn open_store(config: &AppConfig) -> AppResult<Arc<dyn ConversationStore>> {
    let conversation: &ConversationConfig = &config.conversation;
    match conversation.store {
        ConversationBackend::Memory => Ok(Arc::new(MemoryConversationStore::new())),
        ConversationBackend::Sqlite => {
            let path = config.resolve_path(&conversation.path);
            Ok(Arc::new(SqliteConversationStore::open(&path)?))
        }
    }
}

/// Serializes history access per conversation.
///
/// Each conversation id gets its own async mutex, held only while reading
/// or appending; distinct conversations never contend. A lock lives in the
/// table only while some caller holds or awaits it.
pub struct ConversationManager {
    store: Arc<dyn ConversationStore>,
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Wait for exclusive access to `conversation_id`.
    async fn acquire(&self, conversation_id: &str) -> AppResult<ConversationGuard<'_>> {
        if conversation_id.trim().is_empty() {
            return Err(AppError::InvalidQuery(
                "Conversation id cannot be empty".to_string(),
            ));
        }

        let lock = {
            let mut locks = self.locks.lock().map_err(|_| {
                AppError::Conversation("Conversation lock table poisoned".to_string())
            })?;
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let mut guard = ConversationGuard {
            manager: self,
            conversation_id: conversation_id.to_string(),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        Ok(guard)
    }

    /// Drop the table entry for `conversation_id` once nobody else uses it.
    fn release(&self, conversation_id: &str) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(conversation_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    /// Append a single turn.
    pub async fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        text: impl Into<String>,
        retrieval: Option<RetrievalResult>,
    ) -> AppResult<Turn> {
        let turn = Turn {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            retrieval,
        };

        let _guard = self.acquire(conversation_id).await?;
        self.store.append(conversation_id, vec![turn.clone()]).await?;

        tracing::debug!(
            "Appended {} turn to conversation {}",
            turn.role.as_str(),
            conversation_id
        );
        Ok(turn)
    }

    /// Append a user turn and its answer as one unit.
    pub async fn append_exchange(
        &self,
        conversation_id: &str,
        user: Turn,
        assistant: Turn,
    ) -> AppResult<()> {
        let _guard = self.acquire(conversation_id).await?;
        self.store
            .append(conversation_id, vec![user, assistant])
            .await?;

        tracing::debug!("Appended exchange to conversation {}", conversation_id);
        Ok(())
    }

    /// The most recent turns fitting in `max_tokens`, oldest first.
    ///
    /// Turns are never truncated: the walk back from the newest turn stops
    /// at the first turn that does not fit.
    pub async fn get_history(&self, conversation_id: &str, max_tokens: usize) -> AppResult<Vec<Turn>> {
        let turns = {
            let _guard = self.acquire(conversation_id).await?;
            self.store.turns(conversation_id).await?
        };

        let total = turns.len();
        let mut used = 0;
        let mut history: Vec<Turn> = Vec::new();
        for turn in turns.into_iter().rev() {
            let cost = turn.estimated_tokens();
            if used + cost > max_tokens {
                break;
            }
            used += cost;
            history.push(turn);
        }
        history.reverse();

        tracing::debug!(
            "History for {}: {} of {} turn(s), ~{} tokens",
            conversation_id,
            history.len(),
            total,
            used
        );

        Ok(history)
    }

    pub async fn turn_count(&self, conversation_id: &str) -> AppResult<usize> {
        self.store.turn_count(conversation_id).await
    }

    pub async fn list_conversations(&self) -> AppResult<Vec<ConversationSummary>> {
        self.store.list().await
    }
}

/// Exclusive access to one conversation; prunes the lock table on drop.
struct ConversationGuard<'a> {
    manager: &'a ConversationManager,
    conversation_id: String,
    held: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        self.held = None;
        self.manager.release(&self.conversation_id);
    }
}

/// Fresh opaque conversation id.
pub fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
