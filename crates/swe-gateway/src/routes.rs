//! HTTP surface exposing the two triggers from spec.md §6
//! (`onMessageReceived`, `resume`) plus a health check. This is the minimal
//! ingress needed to exercise the core locally; the production chat-app
//! ingress, auth, and web UI are out of scope (spec.md §1).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use swe_agent::AgentTurnLoop;
use swe_core::{Message, SessionKey};
use swe_store::{SessionRecord, SessionStore};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub turn_loop: Arc<AgentTurnLoop>,
    pub sessions: Arc<SessionStore>,
    pub messages: Arc<swe_store::MessageStore>,
    pub started_at: std::time::Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions/:session_id/messages", post(receive_message))
        .route("/sessions/:session_id/resume", post(resume))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
struct IncomingMessage {
    text: String,
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<swe_agent::AgentError> for ApiError {
    fn from(e: swe_agent::AgentError) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<swe_store::StoreError> for ApiError {
    fn from(e: swe_store::StoreError) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

async fn ensure_session(sessions: &SessionStore, key: &SessionKey) -> Result<(), ApiError> {
    if sessions.get(key).await?.is_none() {
        sessions.create(SessionRecord::new(key.clone())).await?;
    }
    Ok(())
}

/// `onMessageReceived(workerId, cancellationToken)` (spec.md §6 "Triggers"):
/// appends the incoming user message, then drives one full turn.
async fn receive_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<IncomingMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let worker_id = SessionKey::new(session_id);
    ensure_session(&state.sessions, &worker_id).await?;
    state
        .messages
        .append(&worker_id, &Message::user_text(body.text))
        .await?;

    let cancel = CancellationToken::new();
    state.turn_loop.on_message_received(&worker_id, &cancel).await?;

    Ok(Json(json!({ "status": "accepted" })))
}

/// `resume(workerId, cancellationToken)` (spec.md §6 "Triggers").
async fn resume(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let worker_id = SessionKey::new(session_id);
    let cancel = CancellationToken::new();
    state.turn_loop.resume(&worker_id, &cancel).await?;
    Ok(Json(json!({ "status": "resumed" })))
}
