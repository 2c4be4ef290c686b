//! Document ingestion: chunk, embed, then index.

use crate::chunker::Chunker;
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::types::{Chunk, IngestReport};
use crate::vector_index::VectorIndexClient;
use docent_core::AppResult;

/// Runs a document through the chunker, the embedder and the index.
#[derive(Clone)]
pub struct Ingestor {
    chunker: Chunker,
    embedder: Embedder,
    index: VectorIndexClient,
}

impl Ingestor {
    pub fn new(chunker: Chunker, embedder: Embedder, index: VectorIndexClient) -> Self {
        Self {
            chunker,
            embedder,
            index,
        }
    }

    pub fn index(&self) -> &VectorIndexClient {
        &self.index
    }

    /// Index `document`, replacing any previous version with the same id.
    ///
    /// Replacement is all or nothing. Every chunk is embedded before the
    /// index is touched and the store swaps the chunk set atomically, so a
    /// failed re-ingest leaves the previous version indexed and searchable.
    /// Callers wanting the stale version gone must [`Ingestor::remove`] it.
    pub async fn ingest(&self, document: &Document) -> AppResult<IngestReport> {
        tracing::info!(
            "Ingesting {} ({} chars, {})",
            document.id,
            document.char_len(),
            document.metadata.content_type.as_str()
        );

        let chunks = self.chunker.chunk(document)?;
        let total = chunks.len();

        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .filter(|chunk| {
                let blank = chunk.text.trim().is_empty();
                if blank {
                    tracing::warn!("Skipping blank chunk {}", chunk.id());
                }
                !blank
            })
            .collect();
        let skipped = total - chunks.len();

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let replaced = self.index.upsert(&document.id, &chunks, vectors).await?;

        Ok(IngestReport {
            document_id: document.id.clone(),
            chunks_indexed: chunks.len(),
            chunks_skipped: skipped,
            chunks_replaced: replaced,
            content_hash: document.metadata.content_hash.clone(),
        })
    }

    /// Remove a document from the index, returning the number of chunks removed.
    pub async fn remove(&self, document_id: &str) -> AppResult<usize> {
        self.index.delete(document_id).await
    }
}
