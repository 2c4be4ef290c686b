//! Ollama Embedding Provider
//!
//! Provides semantic embeddings via Ollama's local API using models like nomic-embed-text.
//!
//! # Example
//! ```no_run
//! use docent_knowledge::embeddings::providers::ollama::OllamaProvider;
//! use docent_knowledge::embeddings::EmbeddingProvider;
//!
//! # async fn example() -> docent_core::AppResult<()> {
//! let provider = OllamaProvider::new(None, "nomic-embed-text", 768)?;
//! let embeddings = provider.embed_batch(&["Hello world".to_string()]).await?;
//! assert_eq!(embeddings[0].len(), 768);
//! # Ok(())
//! # }
//! ```

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use docent_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Ollama API endpoint for embeddings
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embed";

/// Ollama embedding provider using local API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    /// Ollama API base URL
    base_url: String,
    /// Model name (e.g., "nomic-embed-text")
    model: String,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Request payload for Ollama's batch embed API
#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// Response from Ollama's batch embed API, one vector per input
#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Error response from Ollama API
#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create a provider. No request is made until the first embed call.
    ///
    /// The endpoint falls back to `OLLAMA_URL`, then to the local default.
    pub fn new(endpoint: Option<&str>, model: &str, dimensions: usize) -> AppResult<Self> {
        let client = Client::builder().build().map_err(|e| {
            AppError::Config(format!("Failed to create HTTP client for Ollama: {}", e))
        })?;

        let base_url = endpoint
            .map(str::to_string)
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }

    /// Embed `inputs` in one request (no retries).
    async fn embed_inputs(&self, inputs: Vec<&str>) -> AppResult<Vec<Vec<f32>>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let expected = inputs.len();

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::EmbeddingService(format!("Failed to send request to Ollama: {}", e))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
                Ok(error_response) => error_response.error,
                Err(_) => error_text,
            };

            return Err(status_error(status, &self.model, message));
        }

        let response_body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingService(format!("Failed to parse Ollama response: {}", e))
        })?;

        if response_body.embeddings.len() != expected {
            return Err(AppError::EmbeddingService(format!(
                "Ollama returned {} embedding(s) for {} input(s)",
                response_body.embeddings.len(),
                expected
            )));
        }

        Ok(response_body.embeddings)
    }
}

/// Server-side and rate-limit failures are transient; anything else in the
/// 4xx range (unknown model, bad request) is a configuration problem.
fn status_error(status: StatusCode, model: &str, message: String) -> AppError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AppError::EmbeddingService(format!("Ollama API error ({}): {}", status, message))
    } else {
        AppError::Config(format!(
            "Ollama rejected embedding request for model '{}' ({}): {}. Run: ollama pull {}",
            model, status, message, model
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        debug!("Embedding batch of {} texts with {}", texts.len(), self.model);

        let mut embeddings = vec![vec![0.0; self.dimensions]; texts.len()];
        let mut positions = Vec::with_capacity(texts.len());
        let mut inputs = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                warn!("Blank text at index {}, using zero vector", i);
                continue;
            }
            positions.push(i);
            inputs.push(text.as_str());
        }

        if inputs.is_empty() {
            return Ok(embeddings);
        }

        let vectors = self.embed_inputs(inputs).await?;
        for (position, vector) in positions.into_iter().zip(vectors) {
            embeddings[position] = vector;
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
