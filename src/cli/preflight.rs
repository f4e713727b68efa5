//! Pre-flight checks before expensive operations.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway.

use crate::config::{Settings, StorageProvider};
use crate::error::{CoachError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Embedding chunks needs the API key.
    Ingest,
    /// Answering needs the API key for embeddings and chat.
    Chat,
    /// Search embeds the query.
    Search,
    /// Listing sources only reads the index.
    Browse,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Ingest | Operation::Chat | Operation::Search => {
            check_api_key()?;
        }
        Operation::Browse => {}
    }

    if matches!(operation, Operation::Ingest) && settings.index.provider == StorageProvider::Memory
    {
        return Err(CoachError::Config(
            "index.provider is 'memory'; ingested chunks would be lost on exit".to_string(),
        ));
    }

    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(CoachError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(CoachError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}
