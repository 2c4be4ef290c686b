//! Query-time retrieval: embed, search, threshold, deduplicate.

use crate::embeddings::Embedder;
use crate::types::{RetrievalResult, ScoredChunk};
use crate::vector_index::VectorIndexClient;
use docent_core::config::RetrievalConfig;
use docent_core::AppResult;

/// Turns a query into ranked, thresholded, deduplicated passages.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    index: VectorIndexClient,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(embedder: Embedder, index: VectorIndexClient, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to `top_k` passages scoring at least `min_score`.
    ///
    /// A blank query yields an empty result without embedding anything.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> AppResult<RetrievalResult> {
        if query.trim().is_empty() {
            tracing::debug!("Blank query, skipping retrieval");
            return Ok(RetrievalResult::empty());
        }

        let vector = self.embedder.embed_query(query).await?;
        let candidates = self.index.search(&vector, top_k).await?;
        let found = candidates.len();

        let passages = rank(candidates, min_score, self.config.dedup_overlap);

        tracing::info!(
            "Retrieved {} passage(s) from {} candidate(s) (top-{}, min score {:.2})",
            passages.len(),
            found,
            top_k,
            min_score
        );

        Ok(RetrievalResult { passages })
    }
}

/// Threshold, sort by descending score and collapse overlapping spans.
///
/// Two chunks of the same document are duplicates when their shared span
/// exceeds `dedup_overlap` of the shorter one; the higher score survives.
pub fn rank(candidates: Vec<ScoredChunk>, min_score: f32, dedup_overlap: f32) -> Vec<ScoredChunk> {
    let mut candidates: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| c.score >= min_score)
        .collect();

    // Stable, so equal scores keep the index's order
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<ScoredChunk> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = kept.iter().any(|k| {
            if k.chunk.chunk_id == candidate.chunk.chunk_id {
                return true;
            }
            let shorter = k.chunk.span_len().min(candidate.chunk.span_len());
            if shorter == 0 {
                return false;
            }
            let shared = k.chunk.span_overlap(&candidate.chunk);
            shared as f32 / shorter as f32 > dedup_overlap
        });

        if duplicate {
            tracing::debug!("Dropping overlapping passage {}", candidate.chunk.chunk_id);
        } else {
            kept.push(candidate);
        }
    }

    kept
}
