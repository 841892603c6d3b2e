//! HTTP front end for question answering.
//!
//! `POST /ask` with `{"question": "..."}` answers from the index loaded at
//! startup and returns `{"answer": "...", "cited_context": "..."}`.
//! `GET /health` reports readiness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::answer::{AskError, QuestionAnswerer};
use crate::documents::DocumentIndex;
use crate::{debug_event, log_event};

/// What every request shares.
pub struct AppState {
    pub answerer: QuestionAnswerer,
    pub index: DocumentIndex,
    pub use_coarse_stage: bool,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AskResponse {
    pub answer: String,
    pub cited_context: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// Request failure mapped to a status code.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Ask(AskError),
}

impl From<AskError> for ApiError {
    fn from(e: AskError) -> Self {
        Self::Ask(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Ask(e @ AskError::Llm(_)) => (StatusCode::BAD_GATEWAY, e.to_string()),
            Self::Ask(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        if status.is_server_error() {
            tracing::warn!(target: "server", "request failed: {message}");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Routes over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .with_state(state)
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    debug_event!("server", "ask", "{question}");
    let answer = state
        .answerer
        .ask(question, &state.index, state.use_coarse_stage)
        .await?;

    Ok(Json(AskResponse {
        answer: answer.answer,
        cited_context: answer.cited_context,
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sections": state.index.section_count(),
        "chunks": state.index.chunk_count(),
    }))
}

/// Serve on `bind` until ctrl+c.
pub async fn serve_http(state: AppState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let address = listener.local_addr()?;
    log_event!(
        "server",
        "listening",
        "{address} ({} chunks)",
        state.index.chunk_count()
    );
    eprintln!("Answering on http://{address}/ask");

    let app = router(Arc::new(state));
    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("Shutting down HTTP server...");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "server", "failed to listen for ctrl+c: {e}");
        std::future::pending::<()>().await;
    }
    eprintln!("Received shutdown signal");
}
