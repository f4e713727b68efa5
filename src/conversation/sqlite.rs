//! SQLite-based conversation store.

use super::ConversationStore;
use crate::error::{CoachError, Result};
use crate::model::{Conversation, Feedback, Message, Rating, Role};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    last_active_at TEXT NOT NULL,
    summary TEXT,
    message_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_conversations_last_active ON conversations(last_active_at);

CREATE TABLE IF NOT EXISTS messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    citations TEXT,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, seq);

CREATE TABLE IF NOT EXISTS feedback (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    rating INTEGER NOT NULL,
    comment TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feedback_message ON feedback(message_id);
"#;

const MESSAGE_COLUMNS: &str = "id, role, content, timestamp, citations, metadata";

/// SQLite-based conversation store.
pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SqliteConversationStore {
    /// Open (or create) a store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite conversation store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CoachError::Storage(format!("Failed to acquire lock: {}", e)))
    }

    fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
        let started_at: String = row.get(2)?;
        let last_active_at: String = row.get(3)?;
        Ok(Conversation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            started_at: parse_ts(&started_at),
            last_active_at: parse_ts(&last_active_at),
            summary: row.get(4)?,
            message_count: row.get(5)?,
        })
    }

    fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
        let role: String = row.get(1)?;
        let timestamp: String = row.get(3)?;
        let citations: Option<String> = row.get(4)?;
        let metadata: Option<String> = row.get(5)?;

        Ok(Message {
            id: row.get(0)?,
            role: role.parse().unwrap_or(Role::User),
            content: row.get(2)?,
            timestamp: parse_ts(&timestamp),
            citations: citations.and_then(|json| serde_json::from_str(&json).ok()),
            metadata: metadata.and_then(|json| serde_json::from_str(&json).ok()),
        })
    }

    fn load_conversation(conn: &Connection, session_id: &str) -> Result<Conversation> {
        conn.query_row(
            "SELECT id, user_id, started_at, last_active_at, summary, message_count
             FROM conversations WHERE id = ?1",
            params![session_id],
            Self::row_to_conversation,
        )
        .optional()?
        .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    #[instrument(skip(self))]
    async fn create_session(&self, user_id: &str) -> Result<Conversation> {
        let conversation = Conversation::new(user_id);
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO conversations (id, user_id, started_at, last_active_at, summary, message_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conversation.id,
                conversation.user_id,
                format_ts(&conversation.started_at),
                format_ts(&conversation.last_active_at),
                conversation.summary,
                conversation.message_count,
            ],
        )?;

        info!(session_id = %conversation.id, "Created session");
        Ok(conversation)
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Conversation> {
        let conn = self.lock()?;
        Self::load_conversation(&conn, session_id)
    }

    #[instrument(skip(self, message), fields(message_id = %message.id))]
    async fn append_message(&self, session_id: &str, message: &Message) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let mut conversation = Self::load_conversation(&tx, session_id)?;
        conversation.record_message(message.timestamp);

        let citations = message
            .citations
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "INSERT INTO messages (id, session_id, role, content, timestamp, citations, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                session_id,
                message.role.as_str(),
                message.content,
                format_ts(&message.timestamp),
                citations,
                metadata,
            ],
        )?;

        tx.execute(
            "UPDATE conversations SET message_count = ?1, last_active_at = ?2 WHERE id = ?3",
            params![
                conversation.message_count,
                format_ts(&conversation.last_active_at),
                session_id,
            ],
        )?;

        tx.commit()?;
        debug!("Appended message to session {}", session_id);
        Ok(())
    }

    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        Self::load_conversation(&conn, session_id)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2",
            MESSAGE_COLUMNS
        ))?;

        let rows = stmt.query_map(params![session_id, limit as i64], Self::row_to_message)?;
        let mut messages = rows.collect::<rusqlite::Result<Vec<Message>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>> {
        let conn = self.lock()?;
        let message = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
                params![message_id],
                Self::row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    #[instrument(skip(self, feedback), fields(message_id = %feedback.message_id))]
    async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        let conn = self.lock()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
            params![feedback.message_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(CoachError::MessageNotFound(feedback.message_id.clone()));
        }

        conn.execute(
            "INSERT INTO feedback (id, message_id, rating, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.id,
                feedback.message_id,
                feedback.rating.value(),
                feedback.comment,
                format_ts(&feedback.created_at),
            ],
        )?;

        info!("Recorded feedback {}", feedback.id);
        Ok(())
    }

    async fn feedback_for(&self, message_id: &str) -> Result<Vec<Feedback>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, message_id, rating, comment, created_at
             FROM feedback WHERE message_id = ?1 ORDER BY created_at",
        )?;

        let rows = stmt.query_map(params![message_id], |row| {
            let rating: u8 = row.get(2)?;
            let created_at: String = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                rating,
                row.get::<_, Option<String>>(3)?,
                created_at,
            ))
        })?;

        let mut feedback = Vec::new();
        for row in rows {
            let (id, message_id, rating, comment, created_at) = row?;
            feedback.push(Feedback {
                id,
                message_id,
                rating: Rating::try_from(rating).map_err(CoachError::Storage)?,
                comment,
                created_at: parse_ts(&created_at),
            });
        }
        Ok(feedback)
    }

    #[instrument(skip(self))]
    async fn purge_inactive(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let cutoff = format_ts(&before);

        tx.execute(
            "DELETE FROM feedback WHERE message_id IN (
                SELECT m.id FROM messages m
                JOIN conversations c ON c.id = m.session_id
                WHERE c.last_active_at < ?1)",
            params![cutoff],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE session_id IN (
                SELECT id FROM conversations WHERE last_active_at < ?1)",
            params![cutoff],
        )?;
        let removed = tx.execute(
            "DELETE FROM conversations WHERE last_active_at < ?1",
            params![cutoff],
        )?;

        tx.commit()?;
        if removed > 0 {
            info!("Purged {} inactive conversations", removed);
        }
        Ok(removed)
    }
}
