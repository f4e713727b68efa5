//! Coach orchestrator.
//!
//! Coordinates one chat turn from request validation through retrieval,
//! citation building and the model call, to persisting both messages.

use crate::config::{Prompts, Settings, StorageProvider};
use crate::conversation::{ConversationStore, MemoryConversationStore, SqliteConversationStore};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{CoachError, Result};
use crate::index::{DocumentIndex, MemoryDocumentIndex, SqliteDocumentIndex};
use crate::model::{
    ChatRequest, ChatResponse, Citation, Conversation, Feedback, FeedbackRequest,
    FeedbackResponse, Message, MessageMetadata, RetrievalResult, Role,
};
use crate::rag::{
    format_context_for_prompt, ChatTurn, CitationBuilder, CompletionRequest, LanguageModel,
    OpenAIChatModel, Retriever,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

type SessionLock = Arc<tokio::sync::Mutex<()>>;

/// The top-level coach component.
pub struct CoachOrchestrator {
    conversations: Arc<dyn ConversationStore>,
    index: Arc<dyn DocumentIndex>,
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    citations: CitationBuilder,
    llm: Arc<dyn LanguageModel>,
    prompts: Prompts,
    top_k: usize,
    history_window: usize,
    max_message_chars: usize,
    llm_timeout: Duration,
    session_locks: Mutex<HashMap<String, SessionLock>>,
}

impl CoachOrchestrator {
    /// Build the orchestrator and all of its collaborators from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let (conversations, index): (Arc<dyn ConversationStore>, Arc<dyn DocumentIndex>) =
            match settings.index.provider {
                StorageProvider::Sqlite => {
                    let path = settings.sqlite_path();
                    info!("Using SQLite storage at {:?}", path);
                    (
                        Arc::new(SqliteConversationStore::new(&path)?),
                        Arc::new(SqliteDocumentIndex::new(&path)?),
                    )
                }
                StorageProvider::Memory => {
                    info!("Using in-memory storage");
                    (
                        Arc::new(MemoryConversationStore::new()),
                        Arc::new(MemoryDocumentIndex::new()),
                    )
                }
            };

        let embedder = create_embedder(&settings.embedding)?;
        let llm = Arc::new(OpenAIChatModel::from_settings(&settings.llm)?);

        Ok(Self::with_components(
            conversations,
            index,
            embedder,
            llm,
            prompts,
            settings,
        ))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        conversations: Arc<dyn ConversationStore>,
        index: Arc<dyn DocumentIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        prompts: Prompts,
        settings: &Settings,
    ) -> Self {
        let retriever =
            Retriever::new(index.clone()).with_min_score(settings.retrieval.min_score);

        Self {
            conversations,
            index,
            embedder,
            retriever,
            citations: CitationBuilder::new(settings.retrieval.max_citations),
            llm,
            prompts,
            top_k: settings.retrieval.top_k,
            history_window: settings.conversation.history_window,
            max_message_chars: settings.conversation.max_message_chars,
            llm_timeout: Duration::from_secs(settings.llm.timeout_seconds),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the bound on a single model call.
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn conversations(&self) -> Arc<dyn ConversationStore> {
        self.conversations.clone()
    }

    pub fn index(&self) -> Arc<dyn DocumentIndex> {
        self.index.clone()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Run one chat turn.
    ///
    /// The user message is stored before retrieval starts. If anything after
    /// that fails, including the model call timing out or the caller dropping
    /// this future, the user message stays and no assistant message is written.
    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    pub async fn handle_chat_request(&self, request: ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        self.validate_chat(&request)?;

        let lock = self.session_lock(&request.session_id)?;
        let _turn = lock.lock().await;

        self.conversations
            .get_conversation(&request.session_id)
            .await?;
        let history = self
            .conversations
            .get_history(&request.session_id, self.history_window)
            .await?;

        let user_message = Message::user(request.message.clone());
        self.conversations
            .append_message(&request.session_id, &user_message)
            .await?;

        let query_embedding = self.embedder.embed(&request.message).await?;
        let results = self
            .retriever
            .retrieve(&query_embedding, self.top_k, request.filter.as_ref())
            .await?;
        let citations = self.citations.build(&results);
        debug!(
            "Retrieved {} chunks, {} citations",
            results.len(),
            citations.len()
        );

        let completion_request =
            self.build_completion_request(&request.message, &history, &results, &citations);

        let completion = tokio::time::timeout(self.llm_timeout, self.llm.complete(&completion_request))
            .await
            .map_err(|_| {
                warn!("Model call exceeded {:?}", self.llm_timeout);
                CoachError::UpstreamModel(format!(
                    "model did not respond within {} seconds",
                    self.llm_timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| match e {
                CoachError::UpstreamModel(msg) => CoachError::UpstreamModel(msg),
                other => CoachError::UpstreamModel(other.to_string()),
            })?;

        let model_used = if completion.model.is_empty() {
            self.llm.model_name().to_string()
        } else {
            completion.model
        };
        let metadata = MessageMetadata {
            model_used: Some(model_used),
            tokens_used: completion.tokens_used,
            response_time: Some(started.elapsed().as_millis() as u64),
            retrieved_chunks: Some(results.len()),
            rag_scores: Some(results.iter().map(|r| r.score).collect()),
        };

        let reply = Message::assistant(completion.content, citations, metadata);
        self.conversations
            .append_message(&request.session_id, &reply)
            .await?;

        info!(
            message_id = %reply.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered chat turn"
        );

        Ok(ChatResponse {
            message_id: reply.id,
            role: Role::Assistant,
            content: reply.content,
            citations: reply.citations.unwrap_or_default(),
            metadata: reply.metadata.unwrap_or_default(),
            timestamp: reply.timestamp,
        })
    }

    /// Start a new session for a user.
    pub async fn create_session(&self, user_id: &str) -> Result<Conversation> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CoachError::Validation("userId must not be empty".to_string()));
        }
        self.conversations.create_session(user_id).await
    }

    /// Look up a session, `None` when it does not exist.
    pub async fn session(&self, session_id: &str) -> Result<Option<Conversation>> {
        match self.conversations.get_conversation(session_id).await {
            Ok(conversation) => Ok(Some(conversation)),
            Err(CoachError::SessionNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The newest `limit` messages of a session, oldest first.
    pub async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.conversations.get_history(session_id, limit).await
    }

    /// Record a rating for a stored message.
    #[instrument(skip(self, request), fields(message_id = %request.message_id))]
    pub async fn submit_feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse> {
        if request.message_id.trim().is_empty() {
            return Err(CoachError::Validation(
                "messageId must not be empty".to_string(),
            ));
        }

        let feedback = Feedback::from(request);
        self.conversations.record_feedback(&feedback).await?;

        Ok(FeedbackResponse {
            feedback_id: feedback.id,
            message_id: feedback.message_id,
            acknowledged: true,
        })
    }

    /// Delete conversations idle for longer than `days`.
    pub async fn purge_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.conversations.purge_inactive(cutoff).await
    }

    fn validate_chat(&self, request: &ChatRequest) -> Result<()> {
        if request.session_id.trim().is_empty() {
            return Err(CoachError::Validation(
                "sessionId must not be empty".to_string(),
            ));
        }
        if request.message.trim().is_empty() {
            return Err(CoachError::Validation("message must not be empty".to_string()));
        }
        let chars = request.message.chars().count();
        if chars > self.max_message_chars {
            return Err(CoachError::Validation(format!(
                "message is {} characters, the limit is {}",
                chars, self.max_message_chars
            )));
        }
        Ok(())
    }

    /// Lock serializing turns of one session. Entries nobody holds are pruned.
    fn session_lock(&self, session_id: &str) -> Result<SessionLock> {
        let mut locks = self
            .session_locks
            .lock()
            .map_err(|e| CoachError::Storage(format!("Failed to acquire lock: {}", e)))?;

        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    fn build_completion_request(
        &self,
        question: &str,
        history: &[Message],
        results: &[RetrievalResult],
        citations: &[Citation],
    ) -> CompletionRequest {
        let context = if citations.is_empty() {
            self.prompts.coach.no_context.clone()
        } else {
            format_context_for_prompt(results, citations)
        };

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), context);

        CompletionRequest {
            system: self
                .prompts
                .render_with_custom(&self.prompts.coach.system, &HashMap::new()),
            history: history.iter().map(ChatTurn::from).collect(),
            prompt: self.prompts.render_with_custom(&self.prompts.coach.user, &vars),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::chunk;
    use crate::model::{CriticalQuestion, Rating, RetrievalFilter};
    use crate::rag::Completion;
    use async_trait::async_trait;

    struct StaticEmbedder;

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct ScriptedModel {
        reply: std::result::Result<String, String>,
        served_model: &'static str,
        delay: Option<Duration>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        fn answering(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                served_model: "scripted-v2",
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                reply: Err(error.to_string()),
                served_model: "scripted-v2",
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<CompletionRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.seen.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.reply {
                Ok(content) => Ok(Completion {
                    content: content.clone(),
                    model: self.served_model.to_string(),
                    tokens_used: Some(99),
                }),
                Err(e) => Err(CoachError::UpstreamModel(e.clone())),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct Fixture {
        coach: CoachOrchestrator,
        store: Arc<MemoryConversationStore>,
        model: Arc<ScriptedModel>,
    }

    async fn fixture(model: ScriptedModel) -> Fixture {
        let index = Arc::new(MemoryDocumentIndex::new());
        index
            .upsert_batch(&[
                chunk("c1", "Learning by Doing", vec![1.0, 0.0]),
                chunk("c2", "Taking Action", vec![0.8, 0.6]),
                chunk("c3", "Unrelated", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let store = Arc::new(MemoryConversationStore::new());
        let model = Arc::new(model);
        let coach = CoachOrchestrator::with_components(
            store.clone(),
            index,
            Arc::new(StaticEmbedder),
            model.clone(),
            Prompts::default(),
            &Settings::default(),
        );

        Fixture {
            coach,
            store,
            model,
        }
    }

    fn request(session_id: &str, message: &str) -> ChatRequest {
        ChatRequest {
            session_id: session_id.to_string(),
            message: message.to_string(),
            filter: None,
        }
    }

    #[tokio::test]
    async fn test_chat_turn_attaches_retrieved_citations() {
        let f = fixture(ScriptedModel::answering("Build shared norms first [1].")).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        let response = f
            .coach
            .handle_chat_request(request(&session.id, "How do we start a PLC?"))
            .await
            .unwrap();

        assert_eq!(response.role, Role::Assistant);
        assert_eq!(response.content, "Build shared norms first [1].");

        let ids: Vec<&str> = response.citations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(response
            .citations
            .windows(2)
            .all(|w| w[0].relevance_score >= w[1].relevance_score));
        assert!(response
            .citations
            .iter()
            .all(|c| (0.0..=1.0).contains(&c.relevance_score)));

        assert_eq!(response.metadata.retrieved_chunks, Some(2));
        assert_eq!(response.metadata.model_used.as_deref(), Some("scripted-v2"));
        assert_eq!(response.metadata.tokens_used, Some(99));
        assert!(response.metadata.response_time.is_some());

        let conversation = f.store.get_conversation(&session.id).await.unwrap();
        assert_eq!(conversation.message_count, 2);

        let history = f.store.get_history(&session.id, 10).await.unwrap();
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].id, response.message_id);

        let prompt = &f.model.seen()[0].prompt;
        assert!(prompt.contains("How do we start a PLC?"));
        assert!(prompt.contains("[1] Learning by Doing (DuFour)"));
        assert!(prompt.contains("content of c2"));
        assert!(!prompt.contains("content of c3"));
    }

    #[tokio::test]
    async fn test_unknown_session_persists_nothing() {
        let f = fixture(ScriptedModel::answering("unused")).await;

        let err = f
            .coach
            .handle_chat_request(request("missing-session", "Hello?"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoachError::SessionNotFound(_)));
        assert!(f.model.seen().is_empty());
        assert!(f.coach.session("missing-session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_model_failure_keeps_user_message_only() {
        let f = fixture(ScriptedModel::failing("rate limited")).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        let err = f
            .coach
            .handle_chat_request(request(&session.id, "What is CQ3?"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::UpstreamModel(_)));

        let history = f.store.get_history(&session.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "What is CQ3?");
    }

    #[tokio::test]
    async fn test_model_timeout_is_upstream_error() {
        let mut model = ScriptedModel::answering("too late");
        model.delay = Some(Duration::from_millis(500));
        let mut f = fixture(model).await;
        f.coach = f.coach.with_llm_timeout(Duration::from_millis(20));
        let session = f.coach.create_session("teacher").await.unwrap();

        let err = f
            .coach
            .handle_chat_request(request(&session.id, "Anyone there?"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::UpstreamModel(_)));

        let history = f.store.get_history(&session.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_model_name_used_when_completion_omits_it() {
        let mut model = ScriptedModel::answering("answer");
        model.served_model = "";
        let f = fixture(model).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        let response = f
            .coach
            .handle_chat_request(request(&session.id, "question"))
            .await
            .unwrap();
        assert_eq!(response.metadata.model_used.as_deref(), Some("scripted"));
    }

    #[tokio::test]
    async fn test_validation() {
        let f = fixture(ScriptedModel::answering("unused")).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        for bad in [request("", "hi"), request(&session.id, "   ")] {
            assert!(matches!(
                f.coach.handle_chat_request(bad).await,
                Err(CoachError::Validation(_))
            ));
        }

        let long = "x".repeat(Settings::default().conversation.max_message_chars + 1);
        assert!(matches!(
            f.coach.handle_chat_request(request(&session.id, &long)).await,
            Err(CoachError::Validation(_))
        ));

        assert!(matches!(
            f.coach.create_session("  ").await,
            Err(CoachError::Validation(_))
        ));
        assert_eq!(
            f.store
                .get_conversation(&session.id)
                .await
                .unwrap()
                .message_count,
            0
        );
    }

    #[tokio::test]
    async fn test_history_is_passed_to_model() {
        let f = fixture(ScriptedModel::answering("answer")).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        f.coach
            .handle_chat_request(request(&session.id, "first question"))
            .await
            .unwrap();
        f.coach
            .handle_chat_request(request(&session.id, "follow up"))
            .await
            .unwrap();

        let seen = f.model.seen();
        assert!(seen[0].history.is_empty());
        assert_eq!(seen[1].history.len(), 2);
        assert_eq!(seen[1].history[0].content, "first question");
        assert_eq!(seen[1].history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_filter_without_matches_uses_no_context_prompt() {
        let f = fixture(ScriptedModel::answering("General guidance.")).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        let mut req = request(&session.id, "How do we extend learning?");
        req.filter = Some(RetrievalFilter {
            critical_question: Some(CriticalQuestion::Extend),
            topics: None,
        });

        let response = f.coach.handle_chat_request(req).await.unwrap();
        assert!(response.citations.is_empty());
        assert_eq!(response.metadata.retrieved_chunks, Some(0));
        assert!(f.model.seen()[0]
            .prompt
            .contains(&Prompts::default().coach.no_context));
    }

    #[tokio::test]
    async fn test_feedback() {
        let f = fixture(ScriptedModel::answering("answer")).await;
        let session = f.coach.create_session("teacher").await.unwrap();
        let response = f
            .coach
            .handle_chat_request(request(&session.id, "question"))
            .await
            .unwrap();

        let ack = f
            .coach
            .submit_feedback(FeedbackRequest {
                message_id: response.message_id.clone(),
                rating: Rating::try_from(5).unwrap(),
                comment: Some("Very practical".to_string()),
            })
            .await
            .unwrap();
        assert!(ack.acknowledged);
        assert_eq!(ack.message_id, response.message_id);

        let err = f
            .coach
            .submit_feedback(FeedbackRequest {
                message_id: "nope".to_string(),
                rating: Rating::try_from(2).unwrap(),
                comment: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn test_session_locks_are_pruned() {
        let f = fixture(ScriptedModel::answering("answer")).await;
        let session = f.coach.create_session("teacher").await.unwrap();
        f.coach
            .handle_chat_request(request(&session.id, "question"))
            .await
            .unwrap();

        let _other = f.coach.session_lock("other").unwrap();
        assert_eq!(f.coach.session_locks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_turns_in_one_session_run_in_sequence() {
        let mut model = ScriptedModel::answering("answer");
        model.delay = Some(Duration::from_millis(50));
        let f = fixture(model).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        let (first, second) = tokio::join!(
            f.coach.handle_chat_request(request(&session.id, "first")),
            f.coach.handle_chat_request(request(&session.id, "second")),
        );
        first.unwrap();
        second.unwrap();

        let seen = f.model.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].history.is_empty());
        assert_eq!(seen[1].history.len(), 2);
        assert_eq!(seen[1].history[0].role, Role::User);
        assert_eq!(seen[1].history[1].role, Role::Assistant);

        let conversation = f.store.get_conversation(&session.id).await.unwrap();
        assert_eq!(conversation.message_count, 4);

        let roles: Vec<Role> = f
            .store
            .get_history(&session.id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_dropped_turn_keeps_user_message_only() {
        let mut model = ScriptedModel::answering("never delivered");
        model.delay = Some(Duration::from_millis(500));
        let f = fixture(model).await;
        let session = f.coach.create_session("teacher").await.unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            f.coach
                .handle_chat_request(request(&session.id, "Are you still there?")),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(f.model.seen().len(), 1);

        let history = f.store.get_history(&session.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Are you still there?");

        let lock = f.coach.session_lock(&session.id).unwrap();
        assert!(lock.try_lock().is_ok());
    }
}
