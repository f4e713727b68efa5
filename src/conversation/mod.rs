//! Conversation store: sessions, their messages and message feedback.

mod memory;
mod sqlite;

pub use memory::MemoryConversationStore;
pub use sqlite::SqliteConversationStore;

use crate::error::Result;
use crate::model::{Conversation, Feedback, Message};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for conversation persistence.
///
/// Every operation keyed by session id fails with
/// [`CoachError::SessionNotFound`](crate::error::CoachError::SessionNotFound)
/// when the session does not exist.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Start a new conversation for a user.
    async fn create_session(&self, user_id: &str) -> Result<Conversation>;

    /// Look up a conversation.
    async fn get_conversation(&self, session_id: &str) -> Result<Conversation>;

    /// Append a message, bumping `message_count` by one and `last_active_at`.
    async fn append_message(&self, session_id: &str, message: &Message) -> Result<()>;

    /// The last `limit` messages of a session, oldest first.
    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Find a message in any session.
    async fn find_message(&self, message_id: &str) -> Result<Option<Message>>;

    /// Store feedback for an existing message.
    async fn record_feedback(&self, feedback: &Feedback) -> Result<()>;

    /// Feedback recorded for a message, oldest first.
    async fn feedback_for(&self, message_id: &str) -> Result<Vec<Feedback>>;

    /// Delete conversations idle since before `before`, with their messages
    /// and feedback. Returns the number of conversations removed.
    async fn purge_inactive(&self, before: DateTime<Utc>) -> Result<usize>;
}

/// Keep the newest `limit` messages of an oldest-first list.
fn tail(messages: &[Message], limit: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(limit);
    messages[start..].to_vec()
}
