//! In-process vector store.

use crate::types::{DocumentSummary, ScoredChunk, VectorRecord};
use crate::vector_index::VectorStore;
use docent_core::{AppResult, SimilarityMetric};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Collection {
    /// (insertion sequence, record), kept in insertion order
    records: Vec<(u64, VectorRecord)>,
    next_seq: u64,
}

/// Vector store held in memory for the lifetime of the process.
///
/// Queries are exact: every record is scored.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: Vec<VectorRecord>,
    ) -> AppResult<usize> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();

        let before = entry.records.len();
        entry
            .records
            .retain(|(_, r)| r.chunk.document_id != document_id);
        let replaced = before - entry.records.len();

        for record in records {
            let seq = entry.next_seq;
            entry.next_seq += 1;
            entry.records.push((seq, record));
        }

        Ok(replaced)
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> AppResult<usize> {
        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = entry.records.len();
        entry
            .records
            .retain(|(_, r)| r.chunk.document_id != document_id);
        Ok(before - entry.records.len())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        metric: SimilarityMetric,
    ) -> AppResult<Vec<ScoredChunk>> {
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(u64, ScoredChunk)> = entry
            .records
            .iter()
            .map(|(seq, record)| {
                (
                    *seq,
                    ScoredChunk {
                        chunk: record.chunk.clone(),
                        score: metric.score(vector, &record.vector),
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn count(&self, collection: &str) -> AppResult<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |c| c.records.len()))
    }

    async fn documents(&self, collection: &str) -> AppResult<Vec<DocumentSummary>> {
        let collections = self.collections.read().await;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        if let Some(entry) = collections.get(collection) {
            for (_, record) in &entry.records {
                *counts.entry(record.chunk.document_id.as_str()).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(document_id, chunk_count)| DocumentSummary {
                document_id: document_id.to_string(),
                chunk_count,
            })
            .collect())
    }
}
