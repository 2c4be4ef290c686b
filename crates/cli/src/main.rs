//! Docent CLI
//!
//! Main entry point for the docent command-line tool.
//! Ingests documents into a local index and answers questions over them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, DeleteCommand, IngestCommand, StatsCommand};
use docent_core::logging::{self, LogFormat};
use docent_core::{config::AppConfig, AppError, AppResult};
use std::path::PathBuf;

/// Docent - conversational answers grounded in your documents
#[derive(Parser, Debug)]
#[command(name = "docent")]
#[command(about = "Conversational answers grounded in your documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DOCENT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DOCENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log line format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama)
    #[arg(short, long, global = true, env = "DOCENT_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "DOCENT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add or replace documents in the index
    Ingest(IngestCommand),

    /// Remove a document from the index
    Delete(DeleteCommand),

    /// Ask a single question
    Ask(AskCommand),

    /// Interactive conversation on stdin
    Chat(ChatCommand),

    /// Show index and conversation statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Explicit workspace and config file decide which YAML is read
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?;

    // Apply CLI overrides
    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if let Some(ref format) = cli.log_format {
        config.log_format = LogFormat::parse(format)
            .ok_or_else(|| AppError::Config(format!("Unknown log format: {}", format)))?;
    }

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    config.validate()?;

    // Log startup
    tracing::info!("Docent CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!(
        "Generation: {} / {}",
        config.generation.provider,
        config.generation.model
    );
    tracing::debug!(
        "Embedding: {} / {} ({} dims)",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimensions
    );

    // Ensure .docent directory exists
    config.ensure_docent_dir()?;

    // Emit command.start span
    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Delete(_) => "delete",
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Delete(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    // Log completion
    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed ({}): {}", e.kind(), e),
    }

    result
}
