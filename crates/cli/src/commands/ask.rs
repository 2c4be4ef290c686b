//! Ask and chat command handlers.
//!
//! Both route queries through the agent orchestrator; `chat` keeps one
//! conversation open across lines read from stdin.

use clap::Args;
use docent_agent::{new_conversation_id, Agent, AgentMode, QueryRequest, QueryResponse};
use docent_core::{config::AppConfig, AppError, AppResult};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: String,

    /// Conversation to continue (default: a new one)
    #[arg(long)]
    pub conversation: Option<String>,

    /// Answer without consulting the document index
    #[arg(long)]
    pub no_rag: bool,

    /// Number of passages to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Minimum similarity score for a passage
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let agent = Agent::open(config).await?;
        let conversation_id = self
            .conversation
            .clone()
            .unwrap_or_else(new_conversation_id);

        let mut request =
            QueryRequest::new(&conversation_id, &self.query).with_mode(mode(self.no_rag));
        request.top_k = self.top_k;
        request.min_score = self.min_score;

        let response = agent.orchestrator.handle_query(&request).await?;

        if self.json {
            let mut output = serde_json::to_value(&response)?;
            output["conversationId"] = serde_json::Value::String(conversation_id);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_response(&response);
            if self.conversation.is_none() {
                println!();
                println!("Conversation: {}", conversation_id);
            }
        }

        Ok(())
    }
}

/// Interactive conversation on stdin
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Conversation to continue (default: a new one)
    #[arg(long)]
    pub conversation: Option<String>,

    /// Answer without consulting the document index
    #[arg(long)]
    pub no_rag: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let agent = Agent::open(config).await?;
        let conversation_id = self
            .conversation
            .clone()
            .unwrap_or_else(new_conversation_id);
        let previous = agent.orchestrator.turn_count(&conversation_id).await?;

        println!("Conversation: {} ({} earlier turn(s))", conversation_id, previous);
        println!("Type /exit or press Ctrl-D to leave.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/exit" || line == "/quit" {
                break;
            }

            let request = QueryRequest::new(&conversation_id, line).with_mode(mode(self.no_rag));
            match agent.orchestrator.handle_query(&request).await {
                Ok(response) => {
                    print_response(&response);
                    println!();
                }
                Err(e @ AppError::Config(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("Query failed: {}", e);
                    eprintln!("Error ({}): {}", e.kind(), e);
                }
            }
        }

        Ok(())
    }
}

fn mode(no_rag: bool) -> AgentMode {
    if no_rag {
        AgentMode::RagDisabled
    } else {
        AgentMode::RagEnabled
    }
}

fn print_response(response: &QueryResponse) {
    println!("{}", response.response_text.trim_end());
    println!();

    if response.grounded {
        println!("Sources:");
        for (i, source) in response.provenance.iter().enumerate() {
            println!(
                "[{}] {} ({}, score {:.3})",
                i + 1,
                source.document_id,
                source.chunk_id,
                source.score
            );
        }
    } else {
        println!("Sources: (ungrounded answer)");
    }
}
