//! Vector index abstraction for knowledge chunks.
//!
//! [`VectorStore`] is the storage boundary; [`VectorIndexClient`] binds a
//! store to one collection and adds validation, retries and timeouts.

use crate::types::{Chunk, DocumentSummary, IndexedChunk, ScoredChunk, VectorRecord};
use docent_core::{with_retry, AppError, AppResult, RetryPolicy, SimilarityMetric};
use std::sync::Arc;

/// Trait for vector store backends.
///
/// Implementations must make `replace_document` atomic: a concurrent
/// `query` sees either the old chunk set or the new one, never a mix.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Replace every record of `document_id` with `records`.
    ///
    /// Returns how many records of the previous version were present.
    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: Vec<VectorRecord>,
    ) -> AppResult<usize>;

    /// Remove every record of `document_id`, returning how many were removed.
    async fn delete_document(&self, collection: &str, document_id: &str) -> AppResult<usize>;

    /// Up to `top_k` records ordered by descending score, ties broken by
    /// insertion order.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        metric: SimilarityMetric,
    ) -> AppResult<Vec<ScoredChunk>>;

    /// Total records in the collection.
    async fn count(&self, collection: &str) -> AppResult<usize>;

    /// Chunk counts per document, ordered by document id.
    async fn documents(&self, collection: &str) -> AppResult<Vec<DocumentSummary>>;
}

/// A vector store bound to one collection.
#[derive(Clone)]
pub struct VectorIndexClient {
    store: Arc<dyn VectorStore>,
    collection: String,
    metric: SimilarityMetric,
    dimensions: usize,
    retry: RetryPolicy,
}

impl VectorIndexClient {
    pub fn new(
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        metric: SimilarityMetric,
        dimensions: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            metric,
            dimensions,
            retry,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Replace the full chunk set of `document_id`.
    ///
    /// `vectors[i]` must be the embedding of `chunks[i]`. Returns the number
    /// of chunks the previous version had.
    pub async fn upsert(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> AppResult<usize> {
        if chunks.len() != vectors.len() {
            return Err(AppError::Knowledge(format!(
                "Got {} vectors for {} chunks of {}",
                vectors.len(),
                chunks.len(),
                document_id
            )));
        }

        if let Some(stray) = chunks.iter().find(|c| c.document_id != document_id) {
            return Err(AppError::Knowledge(format!(
                "Chunk {} does not belong to document {}",
                stray.id(),
                document_id
            )));
        }

        for vector in &vectors {
            self.check_dimensions(vector)?;
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                chunk: IndexedChunk::from(chunk),
                vector,
            })
            .collect();

        let replaced = with_retry(
            &self.retry,
            "index upsert",
            AppError::IndexUnavailable,
            || {
                self.store
                    .replace_document(&self.collection, document_id, records.clone())
            },
        )
        .await?;

        tracing::info!(
            "Indexed {} chunks for {} in '{}' (replaced {})",
            records.len(),
            document_id,
            self.collection,
            replaced
        );

        Ok(replaced)
    }

    /// Remove all chunks of `document_id`. Unknown documents remove nothing.
    pub async fn delete(&self, document_id: &str) -> AppResult<usize> {
        let removed = with_retry(
            &self.retry,
            "index delete",
            AppError::IndexUnavailable,
            || self.store.delete_document(&self.collection, document_id),
        )
        .await?;

        tracing::info!(
            "Removed {} chunks of {} from '{}'",
            removed,
            document_id,
            self.collection
        );

        Ok(removed)
    }

    /// Nearest neighbours of `vector` by the configured metric.
    pub async fn search(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<ScoredChunk>> {
        self.check_dimensions(vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let hits = with_retry(
            &self.retry,
            "index search",
            AppError::IndexUnavailable,
            || {
                self.store
                    .query(&self.collection, vector, top_k, self.metric)
            },
        )
        .await?;

        tracing::debug!(
            "Index returned {} candidates (requested top-{})",
            hits.len(),
            top_k
        );

        Ok(hits)
    }

    pub async fn count(&self) -> AppResult<usize> {
        with_retry(
            &self.retry,
            "index count",
            AppError::IndexUnavailable,
            || self.store.count(&self.collection),
        )
        .await
    }

    pub async fn documents(&self) -> AppResult<Vec<DocumentSummary>> {
        with_retry(
            &self.retry,
            "index documents",
            AppError::IndexUnavailable,
            || self.store.documents(&self.collection),
        )
        .await
    }

    fn check_dimensions(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.dimensions {
            return Err(AppError::Config(format!(
                "Vector dimension mismatch for '{}': expected {}, got {}",
                self.collection,
                self.dimensions,
                vector.len()
            )));
        }
        Ok(())
    }
}
