//! Prompt system for Docent.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions (built-in default, workspace overrides)
//! - Handlebars template rendering
//! - Conversation history and retrieved-context injection with provenance labels

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{default_prompt, load_prompt, resolve_prompt, DEFAULT_PROMPT_ID};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, ContextPassage, HistoryLine, PromptContextConfig,
    PromptDefinition, PromptInput,
};
