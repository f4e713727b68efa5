//! Data model shared by the stores, the retrieval pipeline and the HTTP API.
//!
//! Everything here serializes to camelCase JSON so the wire shapes line up
//! with the web client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("Unknown message role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in a conversation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Create a message with a fresh id and the current timestamp.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            citations: None,
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message carrying its citations and metadata.
    pub fn assistant(
        content: impl Into<String>,
        citations: Vec<Citation>,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            citations: Some(citations),
            metadata: Some(metadata),
            ..Self::new(Role::Assistant, content)
        }
    }
}

/// Bookkeeping attached to assistant messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    /// Wall-clock time for the turn, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_chunks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_scores: Option<Vec<f32>>,
}

/// A reference to source material backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Id of the retrieved chunk this citation points at.
    pub id: String,
    pub source_document: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_or_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Relevance in [0, 1].
    pub relevance_score: f32,
}

/// A chat session between one user and the coach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub message_count: u32,
}

impl Conversation {
    /// Start a new, empty conversation for a user.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            started_at: now,
            last_active_at: now,
            summary: None,
            message_count: 0,
        }
    }

    /// Account for one more message written at `at`.
    pub fn record_message(&mut self, at: DateTime<Utc>) {
        self.message_count += 1;
        if at > self.last_active_at {
            self.last_active_at = at;
        }
    }
}

/// The four PLC critical questions used to classify content.
///
/// Serialized as the question number (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CriticalQuestion {
    /// 1. What do we want students to learn?
    Learn,
    /// 2. How will we know if they have learned it?
    Assess,
    /// 3. How will we respond when some students do not learn?
    Intervene,
    /// 4. How will we extend learning for students who are already proficient?
    Extend,
}

impl CriticalQuestion {
    pub fn number(&self) -> u8 {
        match self {
            CriticalQuestion::Learn => 1,
            CriticalQuestion::Assess => 2,
            CriticalQuestion::Intervene => 3,
            CriticalQuestion::Extend => 4,
        }
    }

    pub fn question(&self) -> &'static str {
        match self {
            CriticalQuestion::Learn => "What do we want students to learn?",
            CriticalQuestion::Assess => "How will we know if they have learned it?",
            CriticalQuestion::Intervene => "How will we respond when some students do not learn?",
            CriticalQuestion::Extend => {
                "How will we extend learning for students who are already proficient?"
            }
        }
    }
}

impl TryFrom<u8> for CriticalQuestion {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(CriticalQuestion::Learn),
            2 => Ok(CriticalQuestion::Assess),
            3 => Ok(CriticalQuestion::Intervene),
            4 => Ok(CriticalQuestion::Extend),
            other => Err(format!("critical question must be 1-4, got {}", other)),
        }
    }
}

impl From<CriticalQuestion> for u8 {
    fn from(q: CriticalQuestion) -> Self {
        q.number()
    }
}

impl std::fmt::Display for CriticalQuestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CQ{}: {}", self.number(), self.question())
    }
}

/// Metadata describing one indexed chunk of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub source_document: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_question: Option<CriticalQuestion>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub token_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One ranked hit returned by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
    pub content: String,
}

/// An embedding produced for a chunk during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingResult {
    pub embedding: Vec<f32>,
    pub chunk_id: String,
}

/// Optional narrowing applied to retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_question: Option<CriticalQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
}

impl RetrievalFilter {
    pub fn is_empty(&self) -> bool {
        self.critical_question.is_none() && self.topics.as_ref().map_or(true, |t| t.is_empty())
    }

    /// Whether a chunk passes the filter.
    ///
    /// The critical question must match exactly; topics match when the chunk
    /// shares at least one of them, ignoring case.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(question) = self.critical_question {
            if metadata.critical_question != Some(question) {
                return false;
            }
        }

        match &self.topics {
            Some(wanted) if !wanted.is_empty() => wanted.iter().any(|w| {
                metadata
                    .topics
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(w.trim()))
            }),
            _ => true,
        }
    }
}

// === API payloads ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RetrievalFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message_id: String,
    pub role: Role,
    pub content: String,
    pub citations: Vec<Citation>,
    pub metadata: MessageMetadata,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Conversation> for SessionResponse {
    fn from(conversation: &Conversation) -> Self {
        Self {
            session_id: conversation.id.clone(),
            user_id: conversation.user_id.clone(),
            created_at: conversation.started_at,
        }
    }
}

/// A feedback rating between 1 and 5 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value))
        } else {
            Err(format!(
                "rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            ))
        }
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> Self {
        r.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub message_id: String,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub feedback_id: String,
    pub message_id: String,
    pub acknowledged: bool,
}

/// Stored feedback on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub message_id: String,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FeedbackRequest> for Feedback {
    fn from(req: FeedbackRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_id: req.message_id,
            rating: req.rating,
            comment: req.comment.filter(|c| !c.trim().is_empty()),
            created_at: Utc::now(),
        }
    }
}
