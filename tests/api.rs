//! Integration tests for the HTTP API.
//!
//! Each test builds its own router over in-memory stores with a fixed
//! embedder and a canned language model.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use plc_coach::config::{Prompts, Settings};
use plc_coach::conversation::MemoryConversationStore;
use plc_coach::embedding::Embedder;
use plc_coach::index::{DocumentIndex, IndexedChunk, MemoryDocumentIndex};
use plc_coach::model::{ChunkMetadata, CriticalQuestion};
use plc_coach::orchestrator::CoachOrchestrator;
use plc_coach::rag::{Completion, CompletionRequest, LanguageModel};
use plc_coach::server::{create_router, AppState};
use plc_coach::{CoachError, Result};

// =============================================================================
// Helpers
// =============================================================================

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }

    fn dimensions(&self) -> usize {
        3
    }
}

struct CannedModel {
    fail: bool,
}

#[async_trait]
impl LanguageModel for CannedModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        if self.fail {
            return Err(CoachError::UpstreamModel("service overloaded".to_string()));
        }
        Ok(Completion {
            content: "Start by agreeing on essential standards [1].".to_string(),
            model: "canned".to_string(),
            tokens_used: Some(120),
        })
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

fn chunk(id: &str, source: &str, section: &str, embedding: Vec<f32>) -> IndexedChunk {
    IndexedChunk::new(
        ChunkMetadata {
            chunk_id: id.to_string(),
            source_document: source.to_string(),
            author: "DuFour, DuFour, Eaker, Many".to_string(),
            section: Some(section.to_string()),
            page_number: Some(24),
            critical_question: Some(CriticalQuestion::Learn),
            topics: vec!["essential standards".to_string()],
            token_count: 180,
            url: None,
        },
        format!("Excerpt {}", id),
        embedding,
    )
}

async fn make_app_with(fail: bool) -> axum::Router {
    let index = Arc::new(MemoryDocumentIndex::new());
    index
        .upsert_batch(&[
            chunk("lbd-1", "Learning by Doing", "Chapter 5", vec![1.0, 0.0, 0.0]),
            chunk("lbd-2", "Learning by Doing", "Chapter 5", vec![0.9, 0.1, 0.0]),
            chunk("ta-1", "Taking Action", "Chapter 2", vec![0.7, 0.7, 0.0]),
            chunk("far-1", "Unrelated Handbook", "Appendix", vec![0.0, 0.0, 1.0]),
        ])
        .await
        .unwrap();

    let coach = CoachOrchestrator::with_components(
        Arc::new(MemoryConversationStore::new()),
        index,
        Arc::new(FixedEmbedder),
        Arc::new(CannedModel { fail }),
        Prompts::default(),
        &Settings::default(),
    );

    create_router(AppState::new(Arc::new(coach), "Phase 1: Foundation Setup"))
}

async fn make_app() -> axum::Router {
    make_app_with(false).await
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a session through the API and return its id.
async fn create_session(app: &axum::Router) -> String {
    let resp = app
        .clone()
        .oneshot(post_json("/api/sessions", r#"{"userId": "teacher-7"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    body["sessionId"].as_str().unwrap().to_string()
}

// =============================================================================
// Health and session stub
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = make_app().await;
    let resp = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["phase"], "Phase 1: Foundation Setup");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_session_lookup_unknown_id() {
    let app = make_app().await;
    let resp = app.oneshot(get("/api/sessions/abc-123")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("abc-123"));
    assert_eq!(body["status"], "not_found");
    assert!(body.get("session").is_none());
}

#[tokio::test]
async fn test_session_lookup_existing() {
    let app = make_app().await;
    let session_id = create_session(&app).await;

    let resp = app
        .oneshot(get(&format!("/api/sessions/{}", session_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["status"], "active");
    assert!(body["message"].as_str().unwrap().contains(&session_id));
    assert_eq!(body["session"]["userId"], "teacher-7");
}

#[tokio::test]
async fn test_create_session_requires_user() {
    let app = make_app().await;
    let resp = app
        .oneshot(post_json("/api/sessions", r#"{"userId": "   "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "validation_error");
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_happy_path() {
    let app = make_app().await;
    let session_id = create_session(&app).await;

    let request = json!({
        "sessionId": session_id,
        "message": "How should our team pick essential standards?"
    });
    let resp = app
        .clone()
        .oneshot(post_json("/api/chat", &request.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["role"], "assistant");
    assert!(body["messageId"].is_string());
    assert!(body["content"].as_str().unwrap().contains("[1]"));

    let citations = body["citations"].as_array().unwrap();
    let ids: Vec<&str> = citations.iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["lbd-1", "ta-1"]);

    let scores: Vec<f64> = citations
        .iter()
        .map(|c| c["relevanceScore"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));

    assert_eq!(body["metadata"]["retrievedChunks"], 3);
    assert_eq!(body["metadata"]["modelUsed"], "canned");

    let resp = app
        .oneshot(get(&format!("/api/sessions/{}/messages", session_id)))
        .await
        .unwrap();
    let history = body_json(resp).await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["id"], body["messageId"]);
}

#[tokio::test]
async fn test_chat_unknown_session() {
    let app = make_app().await;
    let resp = app
        .oneshot(post_json(
            "/api/chat",
            r#"{"sessionId": "missing", "message": "Hello"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body = body_json(resp).await;
    assert_eq!(body["error"], "session_not_found");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_chat_model_failure() {
    let app = make_app_with(true).await;
    let session_id = create_session(&app).await;

    let request = json!({"sessionId": session_id, "message": "What is RTI?"});
    let resp = app
        .clone()
        .oneshot(post_json("/api/chat", &request.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(resp).await["error"], "upstream_error");

    let resp = app
        .oneshot(get(&format!("/api/sessions/{}/messages", session_id)))
        .await
        .unwrap();
    let history = body_json(resp).await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[tokio::test]
async fn test_chat_malformed_body() {
    let app = make_app().await;
    let resp = app
        .oneshot(post_json("/api/chat", r#"{"message": "no session"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "validation_error");
}

#[tokio::test]
async fn test_chat_rejects_bad_critical_question() {
    let app = make_app().await;
    let session_id = create_session(&app).await;

    let request = json!({
        "sessionId": session_id,
        "message": "Extension ideas?",
        "filter": {"criticalQuestion": 9}
    });
    let resp = app
        .oneshot(post_json("/api/chat", &request.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_unknown_session() {
    let app = make_app().await;
    let resp = app
        .oneshot(get("/api/sessions/nope/messages?limit=5"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_rejects_non_numeric_limit() {
    let app = make_app().await;
    let session_id = create_session(&app).await;

    let resp = app
        .oneshot(get(&format!("/api/sessions/{}/messages?limit=abc", session_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()["content-type"], "application/json");

    let body = body_json(resp).await;
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("limit"));
    assert!(body["timestamp"].is_string());
}

// =============================================================================
// Feedback
// =============================================================================

#[tokio::test]
async fn test_feedback_happy_path() {
    let app = make_app().await;
    let session_id = create_session(&app).await;

    let request = json!({"sessionId": session_id, "message": "How do norms help?"});
    let resp = app
        .clone()
        .oneshot(post_json("/api/chat", &request.to_string()))
        .await
        .unwrap();
    let message_id = body_json(resp).await["messageId"]
        .as_str()
        .unwrap()
        .to_string();

    let feedback = json!({"messageId": message_id, "rating": 4, "comment": "useful"});
    let resp = app
        .oneshot(post_json("/api/feedback", &feedback.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body = body_json(resp).await;
    assert_eq!(body["acknowledged"], true);
    assert_eq!(body["messageId"], message_id);
    assert!(body["feedbackId"].is_string());
}

#[tokio::test]
async fn test_feedback_rating_out_of_range() {
    let app = make_app().await;
    for rating in [0, 6] {
        let feedback = json!({"messageId": "any", "rating": rating});
        let resp = app
            .clone()
            .oneshot(post_json("/api/feedback", &feedback.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_feedback_unknown_message() {
    let app = make_app().await;
    let resp = app
        .oneshot(post_json(
            "/api/feedback",
            r#"{"messageId": "does-not-exist", "rating": 3}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "message_not_found");
}
