//! Query orchestration: history, retrieval, prompt assembly, generation.
//!
//! A query moves through [`TurnState`]s in order. Nothing is written to the
//! conversation until generation succeeds, so an error or a dropped future
//! before `Responded` leaves history untouched.

use crate::conversation::{ConversationManager, Turn};
use docent_core::config::GenerationConfig;
use docent_core::{with_retry, AppError, AppResult};
use docent_knowledge::{RetrievalResult, Retriever};
use docent_llm::{LlmClient, LlmRequest};
use docent_prompt::{build_prompt, ContextPassage, HistoryLine, PromptDefinition, PromptInput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Whether a query consults the document index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentMode {
    #[default]
    RagEnabled,
    RagDisabled,
}

/// Lifecycle of a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Retrieving,
    PromptAssembled,
    Generating,
    Responded,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Received => "received",
            TurnState::Retrieving => "retrieving",
            TurnState::PromptAssembled => "prompt-assembled",
            TurnState::Generating => "generating",
            TurnState::Responded => "responded",
        }
    }
}

/// One user query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub conversation_id: String,
    pub query_text: String,
    pub mode: AgentMode,
    /// Overrides `retrieval.top_k`
    pub top_k: Option<usize>,
    /// Overrides `retrieval.min_score`
    pub min_score: Option<f32>,
}

impl QueryRequest {
    pub fn new(conversation_id: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            query_text: query_text.into(),
            mode: AgentMode::default(),
            top_k: None,
            min_score: None,
        }
    }

    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Where a grounded answer came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub document_id: String,
    pub chunk_id: String,
    pub score: f32,
}

/// Answer to a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub response_text: String,
    /// False when no passage backed the answer (including RAG-disabled turns)
    pub grounded: bool,
    pub provenance: Vec<Provenance>,
}

/// Drives a query from history lookup to a recorded answer.
pub struct Orchestrator {
    retriever: Retriever,
    llm: Arc<dyn LlmClient>,
    conversations: Arc<ConversationManager>,
    prompt: PromptDefinition,
    generation: GenerationConfig,
    history_budget: usize,
}

impl Orchestrator {
    pub fn new(
        retriever: Retriever,
        llm: Arc<dyn LlmClient>,
        conversations: Arc<ConversationManager>,
        prompt: PromptDefinition,
        generation: GenerationConfig,
        history_budget: usize,
    ) -> Self {
        Self {
            retriever,
            llm,
            conversations,
            prompt,
            generation,
            history_budget,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationManager> {
        &self.conversations
    }

    /// Answer `request` and record the exchange.
    ///
    /// # Errors
    /// - `InvalidQuery` for a blank query or conversation id
    /// - `EmbeddingService` / `IndexUnavailable` from retrieval
    /// - `GenerationService` once generation retries are exhausted
    pub async fn handle_query(&self, request: &QueryRequest) -> AppResult<QueryResponse> {
        let span = tracing::info_span!("turn", conversation = %request.conversation_id);
        self.run_query(request).instrument(span).await
    }

    async fn run_query(&self, request: &QueryRequest) -> AppResult<QueryResponse> {
        let query = request.query_text.trim();
        if query.is_empty() {
            return Err(AppError::InvalidQuery("Query cannot be empty".to_string()));
        }

        let conversation_id = request.conversation_id.as_str();
        transition(conversation_id, TurnState::Received);
        let history = self
            .conversations
            .get_history(conversation_id, self.history_budget)
            .await?;

        let retrieval = match request.mode {
            AgentMode::RagEnabled => {
                transition(conversation_id, TurnState::Retrieving);
                let defaults = self.retriever.config();
                let top_k = request.top_k.unwrap_or(defaults.top_k);
                let min_score = request.min_score.unwrap_or(defaults.min_score);
                Some(self.retriever.retrieve(query, top_k, min_score).await?)
            }
            AgentMode::RagDisabled => None,
        };

        let input = PromptInput {
            query: query.to_string(),
            history: history
                .iter()
                .map(|turn| HistoryLine {
                    role: turn.role.as_str().to_string(),
                    text: turn.text.clone(),
                })
                .collect(),
            passages: retrieval
                .as_ref()
                .map(context_passages)
                .unwrap_or_default(),
            rag_enabled: retrieval.is_some(),
        };
        let built = build_prompt(&self.prompt, &input)?;
        transition(conversation_id, TurnState::PromptAssembled);

        let mut llm_request = LlmRequest::new(built.user, &self.generation.model);
        if let Some(system) = built.system {
            llm_request = llm_request.with_system(system);
        }
        if let Some(temperature) = self.generation.temperature {
            llm_request = llm_request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.generation.max_tokens {
            llm_request = llm_request.with_max_tokens(max_tokens);
        }

        transition(conversation_id, TurnState::Generating);
        let response = with_retry(
            &self.generation.retry,
            "generation",
            AppError::GenerationService,
            || self.llm.complete(&llm_request),
        )
        .await?;

        tracing::debug!(
            "Generated {} completion token(s) with {}",
            response.usage.completion_tokens,
            response.model
        );

        let grounded = retrieval.as_ref().is_some_and(|r| !r.is_empty());
        let provenance: Vec<Provenance> = retrieval
            .as_ref()
            .map(RetrievalResult::provenance)
            .unwrap_or_default()
            .into_iter()
            .map(|(document_id, chunk_id, score)| Provenance {
                document_id,
                chunk_id,
                score,
            })
            .collect();

        self.conversations
            .append_exchange(
                conversation_id,
                Turn::user(query),
                Turn::assistant(response.content.clone(), retrieval),
            )
            .await?;
        transition(conversation_id, TurnState::Responded);

        if !grounded {
            tracing::info!("Answer for {} is ungrounded", conversation_id);
        }

        Ok(QueryResponse {
            response_text: response.content,
            grounded,
            provenance,
        })
    }

    /// Number of turns recorded for `conversation_id`.
    pub async fn turn_count(&self, conversation_id: &str) -> AppResult<usize> {
        self.conversations.turn_count(conversation_id).await
    }
}

fn context_passages(retrieval: &RetrievalResult) -> Vec<ContextPassage> {
    retrieval
        .iter()
        .map(|p| ContextPassage {
            document_id: p.chunk.document_id.clone(),
            chunk_id: p.chunk.chunk_id.clone(),
            score: p.score,
            text: p.chunk.text.clone(),
        })
        .collect()
}

fn transition(conversation_id: &str, state: TurnState) {
    tracing::debug!(
        conversation = conversation_id,
        state = state.as_str(),
        "Turn state changed"
    );
}
