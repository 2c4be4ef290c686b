//! Conversational agent for Docent.
//!
//! Ties the knowledge base, prompt system and generation client together:
//! - [`conversation`]: per-conversation history with a token budget
//! - [`orchestrator`]: one query from history lookup to recorded answer

pub mod conversation;
pub mod orchestrator;

#[cfg(test)]
mod tests;

// Re-export main types
pub use conversation::{
    new_conversation_id, ConversationManager, ConversationStore, ConversationSummary, Role, Turn,
};
pub use orchestrator::{
    AgentMode, Orchestrator, Provenance, QueryRequest, QueryResponse, TurnState,
};

use docent_core::{AppConfig, AppResult};
use docent_knowledge::KnowledgeBase;
use docent_llm::{create_client, LlmClient};
use docent_prompt::resolve_prompt;
use std::sync::Arc;

/// A fully wired agent: knowledge base plus orchestrator.
pub struct Agent {
    pub knowledge: KnowledgeBase,
    pub orchestrator: Orchestrator,
}

impl Agent {
    /// Open every configured backend and wire the agent.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        let knowledge = KnowledgeBase::open(config).await?;
        let llm = create_client(
            &config.generation.provider,
            config.generation.endpoint.as_deref(),
        )?;
        let store = conversation::open_store(config)?;
        Self::assemble(config, knowledge, llm, store)
    }

    /// Wire the agent from already opened collaborators.
    pub fn assemble(
        config: &AppConfig,
        knowledge: KnowledgeBase,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn ConversationStore>,
    ) -> AppResult<Self> {
        let prompt = resolve_prompt(&config.workspace, &config.generation.prompt)?;
        tracing::debug!(
            "Agent ready: {} index, {} conversations, {} generation, prompt {}",
            knowledge.index().backend_name(),
            store.backend_name(),
            llm.provider_name(),
            prompt.id
        );

        let orchestrator = Orchestrator::new(
            knowledge.retriever.clone(),
            llm,
            Arc::new(ConversationManager::new(store)),
            prompt,
            config.generation.clone(),
            config.conversation.history_token_budget,
        );

        Ok(Self {
            knowledge,
            orchestrator,
        })
    }
}
