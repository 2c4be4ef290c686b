//! Prompt types for Docent.
//!
//! This module defines the domain entities for the prompt system.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Context injection settings
    #[serde(default)]
    pub context: PromptContextConfig,

    /// System instructions (Handlebars, optional)
    #[serde(default)]
    pub system: Option<String>,

    /// User message template with Handlebars syntax
    pub template: String,
}

/// Context injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContextConfig {
    /// Render prior conversation turns
    #[serde(rename = "includeHistory", default = "default_true")]
    pub include_history: bool,

    /// Render retrieved passages
    #[serde(rename = "includeRetrievedContext", default = "default_true")]
    pub include_retrieved_context: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PromptContextConfig {
    fn default() -> Self {
        Self {
            include_history: true,
            include_retrieved_context: true,
        }
    }
}

/// One prior conversation turn as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLine {
    /// "user" or "assistant"
    pub role: String,
    pub text: String,
}

/// A retrieved passage with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPassage {
    pub document_id: String,
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
}

/// Everything a template can draw on for one turn.
#[derive(Debug, Clone, Default)]
pub struct PromptInput {
    /// The current user query
    pub query: String,

    /// Bounded history, oldest first
    pub history: Vec<HistoryLine>,

    /// Retrieved passages, best first
    pub passages: Vec<ContextPassage>,

    /// Whether retrieval was attempted for this turn
    pub rag_enabled: bool,
}

/// A fully built prompt ready for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Number of history turns rendered
    #[serde(rename = "historyTurns")]
    pub history_turns: usize,

    /// Labels of the passages rendered, in order
    #[serde(rename = "contextLabels")]
    pub context_labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: test.prompt
title: Test Prompt
apiVersion: "1.0"
createdBy: test
context:
  includeHistory: false
template: "{{query}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "test.prompt");
        assert!(!def.context.include_history);
        // Missing flags default to on
        assert!(def.context.include_retrieved_context);
        assert!(def.system.is_none());
    }

    #[test]
    fn test_context_passage_serializes_camel_case() {
        let passage = ContextPassage {
            document_id: "handbook".to_string(),
            chunk_id: "handbook:3".to_string(),
            score: 0.5,
            text: "Leave policy".to_string(),
        };
        let value = serde_json::to_value(&passage).unwrap();
        assert_eq!(value["documentId"], "handbook");
        assert_eq!(value["chunkId"], "handbook:3");
    }
}
