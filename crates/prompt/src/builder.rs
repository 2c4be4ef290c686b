//! Prompt builder for rendering templates and injecting context.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptInput};
use docent_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::json;

/// Build a prompt from a definition and the turn's input.
///
/// This function:
/// 1. Labels retrieved passages `1..n` in rank order
/// 2. Renders the system and user templates with Handlebars
/// 3. Returns a `BuiltPrompt` ready for generation
///
/// Template variables: `query`, `history` (`role`, `text`), `passages`
/// (`label`, `documentId`, `chunkId`, `score`, `text`), and the flags
/// `hasHistory`, `hasContext`, `ragEnabled`.
///
/// # Example
/// ```no_run
/// use docent_prompt::{build_prompt, default_prompt, PromptInput};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let input = PromptInput {
///     query: "What is our leave policy?".to_string(),
///     rag_enabled: true,
///     ..Default::default()
/// };
/// let built = build_prompt(&default_prompt()?, &input)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(definition: &PromptDefinition, input: &PromptInput) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let history = if definition.context.include_history {
        input.history.as_slice()
    } else {
        &[]
    };
    let passages = if definition.context.include_retrieved_context {
        input.passages.as_slice()
    } else {
        &[]
    };

    let labeled: Vec<serde_json::Value> = passages
        .iter()
        .enumerate()
        .map(|(i, p)| {
            json!({
                "label": (i + 1).to_string(),
                "documentId": p.document_id,
                "chunkId": p.chunk_id,
                "score": format!("{:.4}", p.score),
                "text": p.text.trim(),
            })
        })
        .collect();

    let context_labels = (1..=labeled.len()).map(|i| i.to_string()).collect();

    let variables = json!({
        "query": input.query,
        "history": history,
        "passages": labeled,
        "hasHistory": !history.is_empty(),
        "hasContext": !passages.is_empty(),
        "ragEnabled": input.rag_enabled,
    });

    let handlebars = registry();
    let user = render(&handlebars, &definition.template, &variables)?;
    let system = match definition.system {
        Some(ref template) => Some(render(&handlebars, template, &variables)?.trim().to_string()),
        None => None,
    };

    tracing::debug!(
        "Built prompt with {} history turn(s) and {} passage(s)",
        history.len(),
        passages.len()
    );

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            history_turns: history.len(),
            context_labels,
        },
    })
}

fn registry() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

/// Render a Handlebars template with variables.
fn render(
    handlebars: &Handlebars<'_>,
    template: &str,
    variables: &serde_json::Value,
) -> AppResult<String> {
    handlebars
        .render_template(template, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
