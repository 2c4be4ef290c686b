//! Scenario tests across chunking, ingestion and retrieval.

mod chunking;
mod ingestion;

use crate::embeddings::providers::trigram::TrigramProvider;
use crate::embeddings::EmbeddingProvider;
use crate::types::{DocumentSummary, ScoredChunk, VectorRecord};
use crate::vector_index::VectorStore;
use docent_core::config::IndexBackend;
use docent_core::{AppConfig, AppError, AppResult, RetryPolicy, SimilarityMetric};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory-backed configuration with fast retries.
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.index.backend = IndexBackend::Memory;
    config.embedding.dimensions = 256;
    config.embedding.retry = fast_retry(1);
    config.index.retry = fast_retry(2);
    config.chunking.chunk_size = 200;
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

/// Trigram provider that counts calls and can be told to fail.
#[derive(Debug)]
pub(crate) struct CountingProvider {
    inner: TrigramProvider,
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: TrigramProvider::new(dimensions),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

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

/// Store that is never reachable.
#[derive(Debug, Default)]
pub(crate) struct UnreachableStore {
    pub calls: AtomicUsize,
}

impl UnreachableStore {
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
