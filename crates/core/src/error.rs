//! Error types for Docent.
//!
//! This module defines a unified error enum covering every failure category
//! of the retrieval pipeline and the agent layer: bad input documents,
//! external service failures, index outages and fatal configuration errors.

use thiserror::Error;

/// Unified error type for Docent.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Fatal configuration errors (missing settings, dimension mismatch).
    /// Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input document is empty, binary, or otherwise not usable as text
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Query rejected before any work was done (blank text or empty conversation id)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding model failed (after retries when surfaced to callers)
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// Generation model failed (after retries when surfaced to callers)
    #[error("Generation service error: {0}")]
    GenerationService(String),

    /// Vector store unreachable or failing
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Stored knowledge data could not be decoded
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Conversation history store errors
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Whether the failure may succeed on a later attempt.
    ///
    /// Only external service failures are transient; bad input and
    /// configuration problems are returned to the caller immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::EmbeddingService(_)
                | AppError::GenerationService(_)
                | AppError::IndexUnavailable(_)
        )
    }

    /// Short machine-readable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "configuration",
            AppError::InvalidDocument(_) => "invalid_document",
            AppError::InvalidQuery(_) => "invalid_query",
            AppError::EmbeddingService(_) => "embedding_service",
            AppError::GenerationService(_) => "generation_service",
            AppError::IndexUnavailable(_) => "index_unavailable",
            AppError::Knowledge(_) => "knowledge",
            AppError::Conversation(_) => "conversation",
            AppError::Prompt(_) => "prompt",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
