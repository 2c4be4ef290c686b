//! Stats command handler.
//!
//! Shows what is indexed and which conversations exist.

use clap::Args;
use docent_agent::conversation::{open_store, ConversationManager};
use docent_core::{config::AppConfig, AppResult};
use docent_knowledge::KnowledgeBase;

/// Show index and conversation statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let knowledge = KnowledgeBase::open(config).await?;
        let index = knowledge.index();
        let documents = index.documents().await?;
        let chunk_count = index.count().await?;

        let conversations = ConversationManager::new(open_store(config)?);
        let summaries = conversations.list_conversations().await?;

        if self.json {
            let output = serde_json::json!({
                "index": {
                    "backend": index.backend_name(),
                    "collection": index.collection(),
                    "documentCount": documents.len(),
                    "chunkCount": chunk_count,
                    "documents": documents,
                },
                "conversations": {
                    "backend": conversations.backend_name(),
                    "count": summaries.len(),
                    "items": summaries,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!(
            "Index: {} ({}, collection '{}')",
            index.backend_name(),
            config.embedding.provider,
            index.collection()
        );
        println!("  Documents: {}", documents.len());
        println!("  Chunks: {}", chunk_count);
        for doc in &documents {
            println!("  - {} ({} chunk(s))", doc.document_id, doc.chunk_count);
        }

        println!("Conversations: {}", summaries.len());
        for summary in &summaries {
            println!(
                "  - {} ({} turn(s), last active {})",
                summary.id,
                summary.turn_count,
                summary.last_activity.format("%Y-%m-%d %H:%M")
            );
        }

        Ok(())
    }
}
