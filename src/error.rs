//! Error types for the coach.

use thiserror::Error;

/// Library-level error type for coach operations.
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Document index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Language model error: {0}")]
    UpstreamModel(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for coach operations.
pub type Result<T> = std::result::Result<T, CoachError>;
