//! Question-answering HTTP server.
//!
//! Serves answers and index introspection over JSON once the corpus has
//! been indexed.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/v1/pw_ai_answer` | Answer `{"prompt"}` → `{"response", "sources"}` |
//! | `GET`, `POST` | `/v1/statistics` | File/chunk counts and freshness timestamps |
//! | `POST` | `/v1/pw_list_documents` | Metadata of every indexed document |
//! | `POST` | `/v2/list_documents` | Same as above |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "prompt must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! on another port can call the API.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Settings;
use crate::index::IndexStatistics;
use crate::models::SourceMetadata;
use crate::rag::{RagAnswer, RagAnswerer};

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    answerer: Arc<RagAnswerer>,
}

impl AppState {
    pub fn new(answerer: Arc<RagAnswerer>) -> Self {
        Self { answerer }
    }
}

/// Build the router with every route and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/pw_ai_answer", post(handle_answer))
        .route(
            "/v1/statistics",
            get(handle_statistics).post(handle_statistics),
        )
        .route("/v1/pw_list_documents", post(handle_list_documents))
        .route("/v2/list_documents", post(handle_list_documents))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `server.host:server.port` and serve until the process exits.
pub async fn run_server(settings: &Settings, answerer: Arc<RagAnswerer>) -> anyhow::Result<()> {
    let bind_addr = settings.bind_addr();
    let app = router(AppState::new(answerer));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /v1/pw_ai_answer ============

#[derive(Deserialize)]
struct AnswerRequest {
    #[serde(default)]
    prompt: String,
}

async fn handle_answer(
    State(state): State<AppState>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<RagAnswer>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(bad_request("prompt must not be empty"));
    }

    let answer = state.answerer.answer(prompt).await.map_err(|e| {
        tracing::error!("Answering failed: {:#}", e);
        internal(format!("answer failed: {}", e))
    })?;
    Ok(Json(answer))
}

// ============ /v1/statistics ============

async fn handle_statistics(State(state): State<AppState>) -> Json<IndexStatistics> {
    Json(state.answerer.index().statistics().await)
}

// ============ POST /v1/pw_list_documents, /v2/list_documents ============

async fn handle_list_documents(State(state): State<AppState>) -> Json<Vec<SourceMetadata>> {
    Json(state.answerer.index().list_documents().await)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
