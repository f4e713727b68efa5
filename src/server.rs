//! HTTP API for the coach.
//!
//! JSON endpoints under `/api` for health, sessions, chat and feedback.
//! Failures are reported as [`ErrorResponse`] bodies with a matching status.

use crate::error::CoachError;
use crate::model::{
    ChatRequest, ChatResponse, ErrorResponse, FeedbackRequest, FeedbackResponse, Message,
    SessionCreateRequest, SessionResponse,
};
use crate::orchestrator::CoachOrchestrator;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Default and maximum page size for message history.
const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 200;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub coach: Arc<CoachOrchestrator>,
    /// Release phase reported by `/api/health`.
    pub phase: String,
}

impl AppState {
    pub fn new(coach: Arc<CoachOrchestrator>, phase: impl Into<String>) -> Self {
        Self {
            coach,
            phase: phase.into(),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/messages", get(session_messages))
        .route("/api/chat", post(chat))
        .route("/api/feedback", post(feedback))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Periodically delete conversations idle for more than `retention_days`.
pub fn spawn_retention_task(
    coach: Arc<CoachOrchestrator>,
    retention_days: u32,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match coach.purge_older_than(retention_days).await {
                Ok(0) => {}
                Ok(n) => info!("Retention purge removed {} conversations", n),
                Err(e) => warn!("Retention purge failed: {}", e),
            }
        }
    })
}

// === Errors ===

/// API error mapped to an HTTP status and JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        }

        let body = ErrorResponse {
            error: self.code.to_string(),
            message: self.message,
            timestamp: Utc::now(),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<CoachError> for ApiError {
    fn from(err: CoachError) -> Self {
        let message = err.to_string();
        match err {
            CoachError::Validation(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "validation_error", message)
            }
            CoachError::SessionNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "session_not_found", message)
            }
            CoachError::MessageNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "message_not_found", message)
            }
            CoachError::IndexUnavailable(_) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "index_unavailable", message)
            }
            CoachError::UpstreamModel(_) | CoachError::Embedding(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
            _ => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "validation_error",
            rejection.body_text(),
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "validation_error",
            rejection.body_text(),
        )
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// === Response types ===

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub phase: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub message: String,
    /// `active` or `not_found`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessagesResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

// === Handlers ===

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        phase: state.phase.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let session = state.coach.session(&id).await?;

    let response = match session {
        Some(conversation) => SessionStatusResponse {
            message: format!("Session {} is active", id),
            status: "active".to_string(),
            session: Some(SessionResponse::from(&conversation)),
        },
        None => SessionStatusResponse {
            message: format!("Session {} was not found", id),
            status: "not_found".to_string(),
            session: None,
        },
    };

    Ok(Json(response))
}

async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<SessionMessagesResponse>> {
    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let messages = state.coach.history(&id, limit).await?;

    Ok(Json(SessionMessagesResponse {
        session_id: id,
        messages,
    }))
}

async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<SessionCreateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let Json(req) = payload?;
    let conversation = state.coach.create_session(&req.user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::from(&conversation)),
    ))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(req) = payload?;
    let response = state.coach.handle_chat_request(req).await?;
    Ok(Json(response))
}

async fn feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedbackResponse>)> {
    let Json(req) = payload?;
    let response = state.coach.submit_feedback(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
