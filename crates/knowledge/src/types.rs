//! Knowledge system type definitions.

use serde::{Deserialize, Serialize};

/// Build the stable address of a chunk.
pub fn chunk_id(document_id: &str, chunk_index: u32) -> String {
    format!("{}:{}", document_id, chunk_index)
}

/// A passage cut from one document by the chunker.
///
/// `start` and `end` are character offsets into the document text;
/// `overlap` is the number of leading characters shared with the previous
/// chunk (zero for the first chunk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub index: u32,
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
    pub text: String,
}

impl Chunk {
    pub fn id(&self) -> String {
        chunk_id(&self.document_id, self.index)
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// The payload stored next to each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl From<&Chunk> for IndexedChunk {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id(),
            document_id: chunk.document_id.clone(),
            chunk_index: chunk.index,
            start: chunk.start,
            end: chunk.end,
            text: chunk.text.clone(),
        }
    }
}

impl IndexedChunk {
    /// Characters shared with another span of the same document.
    pub fn span_overlap(&self, other: &IndexedChunk) -> usize {
        if self.document_id != other.document_id {
            return 0;
        }
        self.end.min(other.end).saturating_sub(self.start.max(other.start))
    }

    pub fn span_len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// A chunk with its embedding, ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub chunk: IndexedChunk,
    pub vector: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: IndexedChunk,
    pub score: f32,
}

/// Ranked, thresholded, deduplicated passages for one query.
///
/// Scores never increase along the sequence and chunk ids are unique.
/// An empty result means no grounding is available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passages: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.passages.iter()
    }

    /// (document id, chunk id, score) triples in rank order.
    pub fn provenance(&self) -> Vec<(String, String, f32)> {
        self.passages
            .iter()
            .map(|p| (p.chunk.document_id.clone(), p.chunk.chunk_id.clone(), p.score))
            .collect()
    }
}

/// Outcome of a successful ingest.
///
/// A failed ingest produces no report and leaves any previous version of the
/// document indexed unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_indexed: usize,
    /// Blank chunks dropped before embedding
    pub chunks_skipped: usize,
    /// Chunks of a previous version that were replaced
    pub chunks_replaced: usize,
    pub content_hash: String,
}

/// Per-document statistics from the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub chunk_count: usize,
}
