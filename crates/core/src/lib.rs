//! Docent Core Library
//!
//! This crate provides the foundational utilities shared by every Docent crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Retry and timeout policy for external calls

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use config::{AppConfig, SimilarityMetric};
pub use error::{AppError, AppResult};
pub use retry::{with_retry, RetryPolicy};
