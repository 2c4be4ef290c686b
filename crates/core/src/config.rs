//! Configuration management for Docent.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`.docent/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with local state stored in `.docent/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;
use crate::retry::RetryPolicy;

/// Known generation providers.
pub const GENERATION_PROVIDERS: &[&str] = &["ollama"];

/// Known embedding providers.
pub const EMBEDDING_PROVIDERS: &[&str] = &["ollama", "trigram"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .docent/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log line format
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
    pub generation: GenerationConfig,
}

/// Chunker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks, as a fraction of `chunk_size`
    pub overlap_fraction: f32,

    /// Trailing remainders shorter than this fraction of `chunk_size`
    /// are merged into the previous chunk
    pub min_chunk_fraction: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap_fraction: 0.2,
            min_chunk_fraction: 0.1,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider name ("ollama", "trigram")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Optional provider endpoint
    pub endpoint: Option<String>,

    /// Expected vector dimensionality of the collection
    pub dimensions: usize,

    /// Maximum texts per provider call
    pub batch_size: usize,

    pub retry: RetryPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            endpoint: None,
            dimensions: 384,
            batch_size: 32,
            retry: RetryPolicy::default(),
        }
    }
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Process-local store, lost on exit
    Memory,
    /// Embedded LanceDB table on disk
    #[default]
    Lancedb,
}

impl IndexBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "lancedb" | "lance" => Some(Self::Lancedb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Lancedb => "lancedb",
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    pub backend: IndexBackend,

    /// Index location, relative to the workspace unless absolute
    pub path: PathBuf,

    /// Collection (table) name
    pub collection: String,

    /// Kept small: an unreachable store is an outage, not load
    pub retry: RetryPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            path: PathBuf::from(".docent/index"),
            collection: "documents".to_string(),
            retry: RetryPolicy {
                max_retries: 2,
                backoff_base_ms: 100,
                max_backoff_ms: 1_000,
                timeout_ms: 10_000,
            },
        }
    }
}

/// Similarity metric used for nearest-neighbour search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Dot,
    Euclidean,
}

impl SimilarityMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Some(Self::Cosine),
            "dot" | "inner" => Some(Self::Dot),
            "euclidean" | "l2" => Some(Self::Euclidean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::Euclidean => "euclidean",
        }
    }

    /// Score two vectors; higher is always more similar.
    ///
    /// Euclidean distance `d` is reported as `1 / (1 + d)` so that every
    /// metric shares the same ordering and can be compared to `min_score`.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 0.0;
                }
                dot / (norm_a * norm_b)
            }
            Self::Dot => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
            Self::Euclidean => {
                let distance: f32 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + distance)
            }
        }
    }
}

/// Retriever settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Default number of candidates requested from the index
    pub top_k: usize,

    /// Default similarity threshold
    pub min_score: f32,

    pub metric: SimilarityMetric,

    /// Same-document results whose spans overlap by more than this
    /// fraction of the shorter span are collapsed
    pub dedup_overlap: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: 0.2,
            metric: SimilarityMetric::default(),
            dedup_overlap: 0.5,
        }
    }
}

/// Conversation history backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationBackend {
    Memory,
    #[default]
    Sqlite,
}

/// Conversation state settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Token budget for the history included in each prompt
    pub history_token_budget: usize,

    pub store: ConversationBackend,

    /// SQLite database location, relative to the workspace unless absolute
    pub path: PathBuf,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_token_budget: 2048,
            store: ConversationBackend::default(),
            path: PathBuf::from(".docent/conversations.db"),
        }
    }
}

/// Generation provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Provider name ("ollama")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Optional provider endpoint
    pub endpoint: Option<String>,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,

    /// Prompt definition id (see `.docent/prompts/`)
    pub prompt: String,

    pub retry: RetryPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            temperature: None,
            max_tokens: None,
            prompt: "agent.answer.default".to_string(),
            retry: RetryPolicy {
                max_retries: 2,
                backoff_base_ms: 500,
                max_backoff_ms: 5_000,
                timeout_ms: 120_000,
            },
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    chunking: Option<ChunkingConfig>,
    embedding: Option<EmbeddingConfig>,
    index: Option<IndexConfig>,
    retrieval: Option<RetrievalConfig>,
    conversation: Option<ConversationConfig>,
    generation: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    format: Option<LogFormat>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            log_format: LogFormat::default(),
            verbose: false,
            no_color: false,
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            conversation: ConversationConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `DOCENT_WORKSPACE`: Override workspace path
    /// - `DOCENT_CONFIG`: Path to config file
    /// - `DOCENT_PROVIDER`: Generation provider
    /// - `DOCENT_MODEL`: Generation model identifier
    /// - `DOCENT_EMBEDDING_PROVIDER`: Embedding provider
    /// - `DOCENT_INDEX_BACKEND`: Vector store backend ("memory", "lancedb")
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use docent_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// taking precedence over `DOCENT_WORKSPACE` and `DOCENT_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var("DOCENT_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("DOCENT_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.docent_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;

        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(provider) = std::env::var("DOCENT_PROVIDER") {
            self.generation.provider = provider;
        }

        if let Ok(model) = std::env::var("DOCENT_MODEL") {
            self.generation.model = model;
        }

        if let Ok(provider) = std::env::var("DOCENT_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(backend) = std::env::var("DOCENT_INDEX_BACKEND") {
            self.index.backend = IndexBackend::parse(&backend).ok_or_else(|| {
                AppError::Config(format!("Unknown index backend: {}", backend))
            })?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> Result<Self, serde_yaml::Error> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = format;
            }
        }

        if let Some(chunking) = config_file.chunking {
            result.chunking = chunking;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(conversation) = config_file.conversation {
            result.conversation = conversation;
        }
        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// This method merges command-line flags with the loaded configuration,
    /// giving precedence to CLI flags over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.generation.provider = provider;
        }

        if let Some(model) = model {
            self.generation.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .docent directory.
    pub fn docent_dir(&self) -> PathBuf {
        self.workspace.join(".docent")
    }

    /// Ensure the .docent directory exists.
    pub fn ensure_docent_dir(&self) -> AppResult<()> {
        let docent_dir = self.docent_dir();
        if !docent_dir.exists() {
            std::fs::create_dir_all(&docent_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .docent directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve a configured path against the workspace.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate configuration values.
    ///
    /// Every problem found here is fatal: commands must not start with an
    /// invalid configuration.
    pub fn validate(&self) -> AppResult<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(AppError::Config("chunking.chunkSize must be > 0".to_string()));
        }
        if !(0.0..=0.5).contains(&chunking.overlap_fraction) {
            return Err(AppError::Config(format!(
                "chunking.overlapFraction must be within [0, 0.5], got {}",
                chunking.overlap_fraction
            )));
        }
        if !(chunking.min_chunk_fraction > 0.0 && chunking.min_chunk_fraction < 1.0) {
            return Err(AppError::Config(format!(
                "chunking.minChunkFraction must be within (0, 1), got {}",
                chunking.min_chunk_fraction
            )));
        }

        let embedding = &self.embedding;
        if !EMBEDDING_PROVIDERS.contains(&embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if embedding.dimensions == 0 {
            return Err(AppError::Config("embedding.dimensions must be > 0".to_string()));
        }
        if embedding.batch_size == 0 {
            return Err(AppError::Config("embedding.batchSize must be > 0".to_string()));
        }

        if self.index.collection.trim().is_empty() {
            return Err(AppError::Config("index.collection cannot be empty".to_string()));
        }

        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.topK must be > 0".to_string()));
        }
        if !(-1.0..=1.0).contains(&retrieval.min_score) {
            return Err(AppError::Config(format!(
                "retrieval.minScore must be within [-1, 1], got {}",
                retrieval.min_score
            )));
        }
        if !(0.0..=1.0).contains(&retrieval.dedup_overlap) {
            return Err(AppError::Config(format!(
                "retrieval.dedupOverlap must be within [0, 1], got {}",
                retrieval.dedup_overlap
            )));
        }

        if !GENERATION_PROVIDERS.contains(&self.generation.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            )));
        }

        for (name, policy) in [
            ("embedding.retry", &self.embedding.retry),
            ("index.retry", &self.index.retry),
            ("generation.retry", &self.generation.retry),
        ] {
            if policy.timeout_ms == 0 {
                return Err(AppError::Config(format!("{}.timeoutMs must be > 0", name)));
            }
        }

        Ok(())
    }
}
