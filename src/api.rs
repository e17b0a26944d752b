//! REST API server for the analysis agent
//!
//! Exposes the loop to the chat front-end: the client posts its message
//! plus the visible transcript of prior turns, and receives the rendered
//! transcript and final answer for the new run.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::agent::{AnalystAgent, StreamMode};
use crate::models::RunStatus;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub session_id: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<AnalystAgent>,
}

/// =============================
/// Helpers
/// =============================

/// Map an externally supplied chat id to a stable session id, so the same
/// front-end conversation always lands in the same log file.
fn stable_session_id(external: &str) -> String {
    use sha2::{Digest, Sha256};

    if external.starts_with("session_") {
        return external.to_string();
    }

    let hash = Sha256::digest(external.as_bytes());
    format!("session_{}", &hex::encode(hash)[..16])
}

/// Flatten chat messages into the role-prefixed turn strings the loop's
/// history sanitizer expects.
fn flatten_history(messages: &[ChatMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(format!("User: {}", m.content)),
            "assistant" => Some(format!("Assistant: {}", m.content)),
            _ => None,
        })
        .collect()
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Empty message".into())),
        );
    }

    info!("Received chat request: {}", req.message);

    let history = flatten_history(&req.history);
    let session_id = req
        .session_id
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(stable_session_id);

    // The receiver stays alive for the whole run (a dropped receiver is the
    // cancellation signal); the buffered updates are discarded afterwards
    // since this endpoint returns the finished transcript.
    let (tx, _rx) = mpsc::unbounded_channel();
    let outcome = state
        .agent
        .run(&req.message, &history, StreamMode::Full, session_id, tx)
        .await;

    let status_code = match outcome.status {
        RunStatus::Success | RunStatus::Exhausted => StatusCode::OK,
        RunStatus::Failed => StatusCode::BAD_GATEWAY,
    };

    (
        status_code,
        Json(ApiResponse::success(serde_json::json!({
            "answer": outcome.transcript,
            "final_answer": outcome.final_answer,
            "status": outcome.status,
            "steps": outcome.steps_taken,
            "session_id": outcome.session_id,
        }))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(agent: Arc<AnalystAgent>) -> Router {
    let state = ApiState { agent };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<AnalystAgent>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(agent);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
