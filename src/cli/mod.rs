//! CLI module for the coach.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// PLC Coach - cited answers for Professional Learning Communities
///
/// Ingests a library of pre-chunked PLC material, serves a JSON chat API and
/// answers questions with citations back to the source texts.
#[derive(Parser, Debug)]
#[command(name = "plc-coach")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "PLC_COACH_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long, env = "PLC_COACH_HOST")]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long, env = "PLC_COACH_PORT")]
        port: Option<u16>,
    },

    /// Embed and index chunk records from a .json or .jsonl file
    Ingest {
        /// File of chunk records
        path: String,

        /// Delete existing chunks of each source in the file first
        #[arg(long)]
        replace: bool,
    },

    /// Search the library for relevant chunks
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Minimum similarity score (0.0-1.0, defaults to retrieval.min_score)
        #[arg(short, long)]
        min_score: Option<f32>,

        /// Only chunks tagged with this critical question (1-4)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        critical_question: Option<u8>,

        /// Only chunks tagged with one of these topics
        #[arg(short, long)]
        topic: Vec<String>,
    },

    /// Start an interactive coaching session
    Chat {
        /// User id the session belongs to
        #[arg(short, long, default_value = "cli", env = "PLC_COACH_USER")]
        user: String,
    },

    /// List indexed source documents
    Sources,

    /// Delete conversations idle for longer than the given number of days
    Purge {
        /// Idle days (defaults to conversation.retention_days)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
