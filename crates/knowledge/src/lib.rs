//! Document knowledge for Docent.
//!
//! Turns documents into embedded, indexed chunks and answers similarity
//! queries over them:
//! - [`document`]: content-type checks and text extraction
//! - [`chunker`]: overlapping character windows
//! - [`embeddings`]: provider trait, Ollama and trigram providers, batching
//! - [`vector_index`]: store trait and the collection-bound client
//! - [`ingest`]: chunk, embed, then replace the document in the index
//! - [`rag`]: retrieval with thresholding and span deduplication

pub mod chunker;
pub mod document;
pub mod embeddings;
pub mod ingest;
pub mod lancedb_index;
pub mod memory_index;
pub mod rag;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::Chunker;
pub use document::{ContentType, Document, DocumentMetadata};
pub use embeddings::{Embedder, EmbeddingProvider};
pub use ingest::Ingestor;
pub use lancedb_index::LanceDbStore;
pub use memory_index::MemoryStore;
pub use rag::Retriever;
pub use types::{
    chunk_id, Chunk, DocumentSummary, IndexedChunk, IngestReport, RetrievalResult, ScoredChunk,
    VectorRecord,
};
pub use vector_index::{VectorIndexClient, VectorStore};

use docent_core::config::IndexBackend;
use docent_core::{AppConfig, AppResult};
use std::sync::Arc;

/// The ingestion and retrieval halves, sharing one embedder and index.
#[derive(Clone)]
pub struct KnowledgeBase {
    pub ingestor: Ingestor,
    pub retriever: Retriever,
}

impl KnowledgeBase {
    /// Assemble from an already opened store.
    pub fn with_store(config: &AppConfig, store: Arc<dyn VectorStore>) -> AppResult<Self> {
        let chunker = Chunker::from_config(&config.chunking)?;
        let embedder = Embedder::from_config(&config.embedding)?;
        let index = VectorIndexClient::new(
            store,
            config.index.collection.clone(),
            config.retrieval.metric,
            config.embedding.dimensions,
            config.index.retry.clone(),
        );

        Ok(Self {
            ingestor: Ingestor::new(chunker, embedder.clone(), index.clone()),
            retriever: Retriever::new(embedder, index, config.retrieval.clone()),
        })
    }

    /// Open the configured store and assemble.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        let store = open_store(config).await?;
        Self::with_store(config, store)
    }

    pub fn index(&self) -> &VectorIndexClient {
        self.ingestor.index()
    }
}

/// Open the vector store selected by `index.backend`.
pub async fn open_store(config: &AppConfig) -> AppResult<Arc<dyn VectorStore>> {
    match config.index.backend {
        IndexBackend::Memory => {
            tracing::debug!("Using in-memory vector store");
            Ok(Arc::new(MemoryStore::new()))
        }
        IndexBackend::Lancedb => {
            let path = config.resolve_path(&config.index.path);
            let store = LanceDbStore::open(&path, config.embedding.dimensions).await?;
            Ok(Arc::new(store))
        }
    }
}
