//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, index size and model names |
//! | `POST` | `/process` | Normalize one snippet |
//! | `POST` | `/process_batch` | Normalize a `path → code` map |
//! | `POST` | `/embed` | Embed one snippet |
//! | `POST` | `/embed_batch` | Embed a `path → code` map |
//! | `POST` | `/search` | Top-K similar corpus files |
//! | `POST` | `/check_plagiarism` | LLM verdict for given candidates |
//! | `POST` | `/check` | Full pipeline on a plain-text body |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "User code cannot be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502), `unavailable` (503),
//! `internal` (500). `/check` never errors; failures are reported in its body.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::checker::PlagiarismChecker;
use crate::config::Config;
use crate::embedding;
use crate::error::CheckError;
use crate::models::{CandidateFile, CheckReport, PlagiarismVerdict, SearchOutcome};
use crate::normalize::normalize;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    checker: Arc<PlagiarismChecker>,
    batch_size: usize,
}

impl AppState {
    pub fn new(checker: PlagiarismChecker, batch_size: usize) -> Self {
        Self {
            checker: Arc::new(checker),
            batch_size,
        }
    }

    /// Load everything the handlers need from config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            PlagiarismChecker::from_config(config)?,
            config.embedding.batch_size,
        ))
    }
}

/// Build the router with every endpoint and permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/process", post(handle_process))
        .route("/process_batch", post(handle_process_batch))
        .route("/embed", post(handle_embed))
        .route("/embed_batch", post(handle_embed_batch))
        .route("/search", post(handle_search))
        .route("/check_plagiarism", post(handle_check_plagiarism))
        .route("/check", post(handle_check))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    println!(
        "Loaded index with {} files ({})",
        state.checker.searcher().index().len(),
        state.checker.searcher().embedder().model_name()
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("copyscan server listening on http://{}", config.server.bind);
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<CheckError> for AppError {
    fn from(err: CheckError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            CheckError::InvalidInput(_) | CheckError::EmptyAfterNormalization => {
                return bad_request(message)
            }
            CheckError::Upstream { .. } | CheckError::MalformedResponse { .. } => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            CheckError::Unavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            CheckError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        tracing::warn!(%status, error = %message, "request failed");
        AppError {
            status,
            code,
            message,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    files_indexed: usize,
    embedding_model: String,
    llm_model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let searcher = state.checker.searcher();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        files_indexed: searcher.index().len(),
        embedding_model: searcher.embedder().model_name().to_string(),
        llm_model: state.checker.verdicts().model_name().to_string(),
    })
}

// ============ Normalization ============

#[derive(Deserialize)]
struct CodeRequest {
    code: String,
}

#[derive(Deserialize)]
struct BatchRequest {
    code_snippets: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ProcessResponse {
    processed_code: String,
}

#[derive(Serialize)]
struct ProcessBatchResponse {
    processed_snippets: BTreeMap<String, String>,
}

async fn handle_process(Json(req): Json<CodeRequest>) -> Json<ProcessResponse> {
    Json(ProcessResponse {
        processed_code: normalize(&req.code),
    })
}

async fn handle_process_batch(Json(req): Json<BatchRequest>) -> Json<ProcessBatchResponse> {
    let processed_snippets = req
        .code_snippets
        .iter()
        .map(|(path, code)| (path.clone(), normalize(code)))
        .collect();
    Json(ProcessBatchResponse { processed_snippets })
}

// ============ Embedding ============

#[derive(Serialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct EmbedBatchResponse {
    embeddings: BTreeMap<String, Vec<f32>>,
}

async fn handle_embed(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<EmbedResponse>, AppError> {
    if req.code.trim().is_empty() {
        return Err(bad_request("code must not be empty"));
    }
    let embedder = state.checker.searcher().embedder();
    let embedding = embedding::embed(embedder.as_ref(), &req.code).await?;
    Ok(Json(EmbedResponse { embedding }))
}

async fn handle_embed_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<EmbedBatchResponse>, AppError> {
    if req.code_snippets.is_empty() {
        return Err(bad_request("code_snippets must not be empty"));
    }
    let embedder = state.checker.searcher().embedder();
    let embeddings =
        embedding::embed_batch(embedder.as_ref(), &req.code_snippets, state.batch_size).await?;
    Ok(Json(EmbedBatchResponse { embeddings }))
}

// ============ Search and verdicts ============

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<SearchOutcome>, AppError> {
    Ok(Json(state.checker.searcher().search(&req.code).await?))
}

#[derive(Deserialize)]
struct VerdictRequest {
    user_code: String,
    #[serde(default)]
    similar_files: Vec<CandidateFile>,
}

async fn handle_check_plagiarism(
    State(state): State<AppState>,
    Json(req): Json<VerdictRequest>,
) -> Result<Json<PlagiarismVerdict>, AppError> {
    let verdict = state
        .checker
        .verdicts()
        .check(&req.user_code, &req.similar_files)
        .await?;
    Ok(Json(verdict))
}

async fn handle_check(State(state): State<AppState>, body: String) -> Json<CheckReport> {
    Json(state.checker.check_text(&body).await)
}
