//! Configuration settings for the coach.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub conversation: ConversationSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.plc-coach".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Release phase reported by the health endpoint.
    pub phase: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            phase: "Phase 1: Foundation Setup".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Texts per embedding request during ingestion.
    pub batch_size: usize,
    /// Embedding requests in flight during ingestion.
    pub max_concurrent: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 64,
            max_concurrent: 2,
        }
    }
}

/// Storage backend kind shared by the document index and conversation store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// SQLite file (default).
    #[default]
    Sqlite,
    /// Process memory, lost on exit.
    Memory,
}

impl std::str::FromStr for StorageProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StorageProvider::Sqlite),
            "memory" => Ok(StorageProvider::Memory),
            _ => Err(format!("Unknown storage provider: {}", s)),
        }
    }
}

impl std::fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageProvider::Sqlite => write!(f, "sqlite"),
            StorageProvider::Memory => write!(f, "memory"),
        }
    }
}

/// Document index and conversation storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Storage provider (sqlite, memory).
    pub provider: StorageProvider,
    /// Path to the SQLite database (for the sqlite provider).
    pub sqlite_path: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Sqlite,
            sqlite_path: "~/.plc-coach/coach.db".to_string(),
        }
    }
}

/// Retrieval and citation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks retrieved per turn.
    pub top_k: usize,
    /// Minimum relevance score (0.0-1.0) a chunk needs to be used.
    pub min_score: f32,
    /// Maximum citations attached to a response.
    pub max_citations: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 8,
            min_score: 0.3,
            max_citations: 5,
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Chat model for response generation.
    pub model: String,
    pub temperature: f32,
    /// Upper bound on a single model call.
    pub timeout_seconds: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.4,
            timeout_seconds: 60,
        }
    }
}

/// Conversation handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    /// Prior messages sent to the model as context.
    pub history_window: usize,
    /// Longest accepted user message, in characters.
    pub max_message_chars: usize,
    /// Conversations idle longer than this are purged. Unset keeps everything.
    pub retention_days: Option<u32>,
    /// How often the server runs the retention purge.
    pub purge_interval_minutes: u64,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_message_chars: 4000,
            retention_days: None,
            purge_interval_minutes: 60,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make retrieval or chat misbehave.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CoachError;

        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(CoachError::Config(format!(
                "retrieval.min_score must be within 0.0-1.0, got {}",
                self.retrieval.min_score
            )));
        }
        if self.retrieval.max_citations == 0 {
            return Err(CoachError::Config(
                "retrieval.max_citations must be at least 1".to_string(),
            ));
        }
        if self.conversation.max_message_chars == 0 {
            return Err(CoachError::Config(
                "conversation.max_message_chars must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 || self.embedding.max_concurrent == 0 {
            return Err(CoachError::Config(
                "embedding.batch_size and embedding.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CoachError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plc-coach")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.index.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [retrieval]
            top_k = 3

            [index]
            provider = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.retrieval.max_citations, 5);
        assert_eq!(settings.index.provider, StorageProvider::Memory);
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert!(settings.conversation.retention_days.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.retrieval.min_score = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.conversation.retention_days = Some(30);
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.conversation.retention_days, Some(30));
    }
}
