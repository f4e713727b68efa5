//! In-memory conversation store.

use super::{tail, ConversationStore};
use crate::error::{CoachError, Result};
use crate::model::{Conversation, Feedback, Message};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

struct SessionEntry {
    conversation: Conversation,
    messages: Vec<Message>,
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, SessionEntry>,
    feedback: Vec<Feedback>,
}

/// Conversation store held in process memory.
#[derive(Default)]
pub struct MemoryConversationStore {
    state: RwLock<State>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| CoachError::Storage(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| CoachError::Storage(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_session(&self, user_id: &str) -> Result<Conversation> {
        let conversation = Conversation::new(user_id);
        self.write()?.sessions.insert(
            conversation.id.clone(),
            SessionEntry {
                conversation: conversation.clone(),
                messages: Vec::new(),
            },
        );
        info!(session_id = %conversation.id, user_id, "Created session");
        Ok(conversation)
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Conversation> {
        self.read()?
            .sessions
            .get(session_id)
            .map(|entry| entry.conversation.clone())
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<()> {
        let mut state = self.write()?;
        let entry = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))?;

        entry.conversation.record_message(message.timestamp);
        entry.messages.push(message.clone());
        debug!(session_id, message_id = %message.id, "Appended message");
        Ok(())
    }

    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let state = self.read()?;
        let entry = state
            .sessions
            .get(session_id)
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))?;
        Ok(tail(&entry.messages, limit))
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>> {
        let state = self.read()?;
        Ok(state
            .sessions
            .values()
            .flat_map(|entry| entry.messages.iter())
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        let mut state = self.write()?;
        let exists = state
            .sessions
            .values()
            .any(|entry| entry.messages.iter().any(|m| m.id == feedback.message_id));
        if !exists {
            return Err(CoachError::MessageNotFound(feedback.message_id.clone()));
        }
        state.feedback.push(feedback.clone());
        Ok(())
    }

    async fn feedback_for(&self, message_id: &str) -> Result<Vec<Feedback>> {
        Ok(self
            .read()?
            .feedback
            .iter()
            .filter(|f| f.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn purge_inactive(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut state = self.write()?;

        let stale: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, entry)| entry.conversation.last_active_at < before)
            .map(|(id, _)| id.clone())
            .collect();

        let mut removed_messages = Vec::new();
        for id in &stale {
            if let Some(entry) = state.sessions.remove(id) {
                removed_messages.extend(entry.messages.into_iter().map(|m| m.id));
            }
        }
        state
            .feedback
            .retain(|f| !removed_messages.contains(&f.message_id));

        if !stale.is_empty() {
            info!("Purged {} inactive conversations", stale.len());
        }
        Ok(stale.len())
    }
}
