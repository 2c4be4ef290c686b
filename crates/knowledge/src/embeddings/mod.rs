//! Embedding engine.
//!
//! [`Embedder`] wraps a provider with batching, per-batch timeout and
//! retry, and output validation.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};

use docent_core::config::EmbeddingConfig;
use docent_core::{with_retry, AppError, AppResult, RetryPolicy};
use std::sync::Arc;

/// Provider-agnostic embedding front end.
#[derive(Debug, Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    dimensions: usize,
    retry: RetryPolicy,
}

impl Embedder {
    /// Wrap `provider`, checking it produces vectors of the configured width.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> AppResult<Self> {
        if config.dimensions == 0 || config.batch_size == 0 {
            return Err(AppError::Config(
                "Embedding dimensions and batch size must be positive".to_string(),
            ));
        }

        if provider.dimensions() != config.dimensions {
            return Err(AppError::Config(format!(
                "Embedding provider '{}' ({}) produces {} dimensions, collection expects {}",
                provider.provider_name(),
                provider.model_name(),
                provider.dimensions(),
                config.dimensions
            )));
        }

        Ok(Self {
            provider,
            batch_size: config.batch_size,
            dimensions: config.dimensions,
            retry: config.retry.clone(),
        })
    }

    /// Build the configured provider and wrap it.
    pub fn from_config(config: &EmbeddingConfig) -> AppResult<Self> {
        let provider = create_provider(config)?;
        Self::new(provider, config)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed texts, returning one vector per input in input order.
    pub async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!(
            "Embedding {} texts using provider '{}' (model: {})",
            texts.len(),
            self.provider.provider_name(),
            self.provider.model_name()
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = with_retry(
                &self.retry,
                "embedding batch",
                AppError::EmbeddingService,
                || self.provider.embed_batch(batch),
            )
            .await?;

            self.validate_batch(batch.len(), &embedded)?;
            vectors.extend(embedded);
        }

        tracing::debug!(
            "Generated {} embeddings of dimension {}",
            vectors.len(),
            self.dimensions
        );

        Ok(vectors)
    }

    /// Embed a single text.
    pub async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::EmbeddingService("No embedding returned".to_string()))
    }

    fn validate_batch(&self, expected: usize, vectors: &[Vec<f32>]) -> AppResult<()> {
        if vectors.len() != expected {
            return Err(AppError::Config(format!(
                "Embedding provider '{}' returned {} vectors for {} inputs",
                self.provider.provider_name(),
                vectors.len(),
                expected
            )));
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(AppError::Config(format!(
                "Embedding provider '{}' returned a {}-dimensional vector, expected {}",
                self.provider.provider_name(),
                bad.len(),
                self.dimensions
            )));
        }

        Ok(())
    }
}
