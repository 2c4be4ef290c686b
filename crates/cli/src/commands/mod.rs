//! Command handlers for the Docent CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod ingest;
pub mod stats;

// Re-export command types for convenience
pub use ask::{AskCommand, ChatCommand};
pub use ingest::{DeleteCommand, IngestCommand};
pub use stats::StatsCommand;
