//! Text chunking with configurable size and overlap.

use crate::document::Document;
use crate::types::Chunk;
use docent_core::config::ChunkingConfig;
use docent_core::{AppError, AppResult};

/// Splits documents into overlapping character windows.
///
/// Windows are `chunk_size` characters long and advance by
/// `chunk_size - overlap`. A trailing remainder shorter than `min_chunk`
/// is folded into the previous chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    min_chunk: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize, min_chunk: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::Config("chunkSize must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(AppError::Config(format!(
                "Chunk overlap ({}) must be smaller than chunkSize ({})",
                overlap, chunk_size
            )));
        }
        if min_chunk == 0 || min_chunk > chunk_size {
            return Err(AppError::Config(format!(
                "Minimum chunk ({}) must be between 1 and chunkSize ({})",
                min_chunk, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
            min_chunk,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> AppResult<Self> {
        let size = config.chunk_size as f32;
        let overlap = (size * config.overlap_fraction).round() as usize;
        let min_chunk = ((size * config.min_chunk_fraction).round() as usize).max(1);
        Self::new(config.chunk_size, overlap, min_chunk)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Longest chunk this chunker can emit (a full window plus a merged tail).
    pub fn max_chunk_chars(&self) -> usize {
        self.chunk_size + self.min_chunk - 1
    }

    pub fn chunk(&self, document: &Document) -> AppResult<Vec<Chunk>> {
        self.chunk_text(&document.id, &document.text)
    }

    /// Chunk raw text on behalf of `document_id`.
    pub fn chunk_text(&self, document_id: &str, text: &str) -> AppResult<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidDocument(format!(
                "{} has no text to chunk",
                document_id
            )));
        }

        // Byte offset of every character boundary, including the end
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut prev_end = 0;

        loop {
            let mut end = (start + self.chunk_size).min(total);
            if end < total && total - end < self.min_chunk {
                end = total;
            }

            let overlap = if chunks.is_empty() { 0 } else { prev_end - start };
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                index: chunks.len() as u32,
                start,
                end,
                overlap,
                text: text[bounds[start]..bounds[end]].to_string(),
            });

            if end == total {
                break;
            }
            prev_end = end;
            start += step;
        }

        tracing::debug!(
            "Chunked {} into {} chunks (size: {}, overlap: {})",
            document_id,
            chunks.len(),
            self.chunk_size,
            self.overlap
        );

        Ok(chunks)
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            min_chunk: 100,
        }
    }
}
