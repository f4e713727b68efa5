//! Configuration module for the coach.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{CoachPrompts, Prompts};
pub use settings::{
    ConversationSettings, EmbeddingSettings, GeneralSettings, IndexSettings, LlmSettings,
    PromptSettings, RetrievalSettings, ServerSettings, Settings, StorageProvider,
};
