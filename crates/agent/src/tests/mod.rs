//! Orchestration scenarios against scripted collaborators.

mod orchestration;

use crate::conversation::{ConversationStore, MemoryConversationStore};
use crate::Agent;
use docent_core::config::IndexBackend;
use docent_core::{AppConfig, AppError, AppResult, RetryPolicy, SimilarityMetric};
use docent_knowledge::embeddings::providers::trigram::TrigramProvider;
use docent_knowledge::{
    Chunker, Document, DocumentSummary, Embedder, EmbeddingProvider, Ingestor, KnowledgeBase,
    MemoryStore, Retriever, ScoredChunk, VectorIndexClient, VectorRecord, VectorStore,
};
use docent_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.workspace = std::env::temp_dir().join("docent-agent-tests");
    config.index.backend = IndexBackend::Memory;
    config.embedding.dimensions = 256;
    config.embedding.retry = fast_retry(0);
    config.index.retry = fast_retry(0);
    config.chunking.chunk_size = 200;
    config.generation.retry = fast_retry(1);
    config
}

pub(crate) fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_base_ms: 1,
        max_backoff_ms: 2,
        timeout_ms: 2_000,
    }
}

/// Trigram embeddings with a call counter.
#[derive(Debug)]
pub(crate) struct CountingProvider {
    inner: TrigramProvider,
    calls: AtomicUsize,
    fail: bool,
}

impl CountingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: TrigramProvider::new(dimensions),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Every call fails as if the embedding server were down.
    pub fn failing(dimensions: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimensions)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CountingProvider {
    fn provider_name(&self) -> &str {
        "counting"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::EmbeddingService("connection refused".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

/// Vector store that is never reachable.
#[derive(Debug, Default)]
pub(crate) struct UnreachableStore {
    calls: AtomicUsize,
}

impl UnreachableStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> AppResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::IndexUnavailable("connection refused".to_string()))
    }
}

#[async_trait::async_trait]
impl VectorStore for UnreachableStore {
    fn backend_name(&self) -> &str {
        "unreachable"
    }

    async fn replace_document(
        &self,
        _collection: &str,
        _document_id: &str,
        _records: Vec<VectorRecord>,
    ) -> AppResult<usize> {
        self.fail()
    }

    async fn delete_document(&self, _collection: &str, _document_id: &str) -> AppResult<usize> {
        self.fail()
    }

    async fn query(
        &self,
        _collection: &str,
        _vector: &[f32],
        _top_k: usize,
        _metric: SimilarityMetric,
    ) -> AppResult<Vec<ScoredChunk>> {
        self.fail()
    }

    async fn count(&self, _collection: &str) -> AppResult<usize> {
        self.fail()
    }

    async fn documents(&self, _collection: &str) -> AppResult<Vec<DocumentSummary>> {
        self.fail()
    }
}

/// Generation client that echoes the question and records every request.
///
/// The first `failures` calls fail with a transient error; `delay` is
/// applied before every answer.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    requests: Mutex<Vec<LlmRequest>>,
    failures: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.prompt.clone())
            .unwrap_or_default()
    }
}

/// The answer the echo client gives for `query`.
pub(crate) fn echo_answer(query: &str) -> String {
    format!("echo: {}", query)
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::GenerationService("model not loaded".to_string()));
        }

        let question = request
            .prompt
            .rsplit("Question: ")
            .next()
            .unwrap_or_default()
            .trim();
        Ok(LlmResponse {
            content: echo_answer(question),
            model: request.model.clone(),
            usage: LlmUsage::new(10, 5),
        })
    }
}

/// Agent over memory stores with the given embedding and generation doubles.
pub(crate) fn agent_with(
    provider: Arc<CountingProvider>,
    llm: Arc<ScriptedLlm>,
    store: Arc<dyn ConversationStore>,
) -> Agent {
    agent_over(provider, llm, Arc::new(MemoryStore::new()), store)
}

/// Agent whose document index lives in `vectors`.
pub(crate) fn agent_over(
    provider: Arc<CountingProvider>,
    llm: Arc<ScriptedLlm>,
    vectors: Arc<dyn VectorStore>,
    store: Arc<dyn ConversationStore>,
) -> Agent {
    let config = test_config();
    let embedder = Embedder::new(provider, &config.embedding).unwrap();
    let index = VectorIndexClient::new(
        vectors,
        config.index.collection.clone(),
        config.retrieval.metric,
        config.embedding.dimensions,
        config.index.retry.clone(),
    );
    let knowledge = KnowledgeBase {
        ingestor: Ingestor::new(
            Chunker::from_config(&config.chunking).unwrap(),
            embedder.clone(),
            index.clone(),
        ),
        retriever: Retriever::new(embedder, index, config.retrieval.clone()),
    };

    Agent::assemble(&config, knowledge, llm, store).unwrap()
}

pub(crate) fn memory_agent(provider: Arc<CountingProvider>, llm: Arc<ScriptedLlm>) -> Agent {
    agent_with(provider, llm, Arc::new(MemoryConversationStore::new()))
}

pub(crate) fn handbook() -> Document {
    let text = [
        "Vacation policy: every employee accrues twenty five vacation days per year.",
        "Unused vacation days carry over into the first quarter of the next year.",
        "Expense reports are filed monthly through the finance portal.",
        "Travel must be approved by a manager before any booking is made.",
    ]
    .join("\n");
    Document::from_text("handbook", text).unwrap()
}
