//! Prompt loader for YAML prompt definitions.
//!
//! The answer prompt ships built in; a workspace can replace it (or add new
//! ones) by dropping `<id>.yml` into `.docent/prompts/`.

use crate::types::PromptDefinition;
use docent_core::{AppError, AppResult};
use std::path::Path;

/// Identifier of the built-in answer prompt.
pub const DEFAULT_PROMPT_ID: &str = "agent.answer.default";

const DEFAULT_PROMPT_YAML: &str = include_str!("../prompts/agent.answer.default.yml");

/// The built-in answer prompt.
pub fn default_prompt() -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(DEFAULT_PROMPT_YAML)
        .map_err(|e| AppError::Prompt(format!("Failed to parse built-in prompt: {}", e)))?;
    validate_prompt(&definition)?;
    Ok(definition)
}

/// Resolve a prompt by ID: workspace file first, then the built-in default.
pub fn resolve_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompt_path(workspace_path, prompt_id);
    if prompt_file.exists() {
        return load_prompt(workspace_path, prompt_id);
    }

    if prompt_id == DEFAULT_PROMPT_ID {
        tracing::debug!("Using built-in prompt: {}", prompt_id);
        return default_prompt();
    }

    Err(AppError::Prompt(format!(
        "Prompt file not found: {:?}",
        prompt_file
    )))
}

/// Load a prompt definition by ID from the workspace.
///
/// This function reads `<id>.yml` from the `.docent/prompts/` directory.
///
/// # Example
/// ```no_run
/// use docent_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "agent.answer.default")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompt_path(workspace_path, prompt_id);

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

fn prompt_path(workspace_path: &Path, prompt_id: &str) -> std::path::PathBuf {
    workspace_path
        .join(".docent/prompts")
        .join(format!("{}.yml", prompt_id))
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if !renders_query(&def.template) {
        return Err(AppError::Prompt(format!(
            "Prompt {} never renders {{{{query}}}}",
            def.id
        )));
    }

    Ok(())
}

/// Whether `template` has a `query` expression, in any of the forms
/// `{{query}}`, `{{ query }}`, `{{{query}}}` or `{{~ query ~}}`.
fn renders_query(template: &str) -> bool {
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return false;
        };
        let expression = after[..close]
            .trim_start_matches('{')
            .trim_matches(|c: char| c == '~' || c.is_whitespace());
        if expression == "query" {
            return true;
        }
        rest = &after[close + 2..];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_prompt(dir: &Path, id: &str, valid: bool) -> PathBuf {
        let prompts_dir = dir.join(".docent/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();

        let content = if valid {
            format!(
                r#"
id: {}
title: "Terse answers"
apiVersion: "1.0"
createdBy: test
system: "Answer in one sentence."
template: "Q: {{{{query}}}}"
"#,
                id
            )
        } else {
            "invalid: yaml: content:".to_string()
        };

        let file_path = prompts_dir.join(format!("{}.yml", id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_default_prompt_is_valid() {
        let prompt = default_prompt().unwrap();
        assert_eq!(prompt.id, DEFAULT_PROMPT_ID);
        assert!(prompt.context.include_history);
        assert!(prompt.context.include_retrieved_context);
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "terse", true);

        let prompt = load_prompt(temp_dir.path(), "terse").unwrap();
        assert_eq!(prompt.id, "terse");
        assert_eq!(prompt.system.as_deref(), Some("Answer in one sentence."));
    }

    #[test]
    fn test_workspace_file_overrides_default() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), DEFAULT_PROMPT_ID, true);

        let prompt = resolve_prompt(temp_dir.path(), DEFAULT_PROMPT_ID).unwrap();
        assert_eq!(prompt.title, "Terse answers");
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = resolve_prompt(temp_dir.path(), DEFAULT_PROMPT_ID).unwrap();
        assert_eq!(prompt.title, "Grounded answer");

        assert!(resolve_prompt(temp_dir.path(), "missing").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "invalid", false);

        let result = load_prompt(temp_dir.path(), "invalid");
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_query_placeholder_spacing_is_accepted() {
        assert!(renders_query("Q: {{query}}"));
        assert!(renders_query("Q: {{ query }}"));
        assert!(renders_query("{{#if history}}...{{/if}} Q: {{~  query ~}}"));
        assert!(renders_query("Q: {{{query}}}"));
        assert!(!renders_query("Q: {{queryText}}"));
        assert!(!renders_query("Q: {{#each passages}}{{text}}{{/each}}"));
        assert!(!renders_query("Q: query"));
    }

    #[test]
    fn test_spaced_placeholder_prompt_loads() {
        let temp_dir = TempDir::new().unwrap();
        let prompts_dir = temp_dir.path().join(".docent/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        fs::write(
            prompts_dir.join("spaced.yml"),
            r#"
id: spaced
title: "Spaced placeholder"
apiVersion: "1.0"
template: "Question: {{ query }}"
"#,
        )
        .unwrap();

        let prompt = load_prompt(temp_dir.path(), "spaced").unwrap();
        assert_eq!(prompt.template, "Question: {{ query }}");

        fs::write(
            prompts_dir.join("queryless.yml"),
            "id: queryless\ntitle: \"No query\"\napiVersion: \"1.0\"\ntemplate: \"{{ question }}\"\n",
        )
        .unwrap();
        assert!(matches!(
            load_prompt(temp_dir.path(), "queryless"),
            Err(AppError::Prompt(_))
        ));
    }
}
