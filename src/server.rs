//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Upload a PDF (multipart field `file`); indexing starts in the background |
//! | `GET`  | `/documents` | List uploaded documents |
//! | `GET`  | `/documents/{id}` | One document |
//! | `POST` | `/ask` | Answer a question about a document |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_input", "message": "question must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `invalid_input` | 400 |
//! | `not_found` | 404 |
//! | `extraction_failed` | 422 |
//! | `embedding_provider`, `answer_generation` | 502 |
//! | `index_load`, `storage`, `internal` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend on
//! another port can call the API.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use docqa_core::error::QaError;
use docqa_core::models::RetrievedChunk;

use crate::config::Config;
use crate::db;
use crate::documents::{self, DocumentResponse};
use crate::pipeline::Pipeline;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    pipeline: Arc<Pipeline>,
}

/// Start the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::apply(&pool).await?;
    let pipeline = Arc::new(Pipeline::from_config(config)?);

    let bind_addr = config.server.bind.clone();
    let app = router(Arc::new(config.clone()), pool, pipeline);

    tracing::info!(addr = %bind_addr, "docqa server listening");
    println!("docqa server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(config: Arc<Config>, pool: SqlitePool, pipeline: Arc<Pipeline>) -> Router {
    let body_limit = config.server.max_upload_mb * 1024 * 1024;
    let state = AppState {
        config,
        pool,
        pipeline,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/documents", get(handle_list_documents))
        .route("/documents/{id}", get(handle_get_document))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
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

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        let status = match &err {
            QaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            QaError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            QaError::EmbeddingProvider(_) | QaError::AnswerGeneration(_) => {
                StatusCode::BAD_GATEWAY
            }
            QaError::IndexLoad(_) | QaError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.message().to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_input".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
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

// ============ POST /upload ============

/// Handler for `POST /upload`.
///
/// Stores the PDF, registers it, and schedules indexing on a background
/// task. The response does not wait for indexing; `processed` on
/// `GET /documents/{id}` flips once the index is built.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DocumentResponse>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| bad_request("missing multipart field 'file'"))?;
    if !documents::is_pdf_name(&file_name) {
        return Err(bad_request("Only PDF files are supported"));
    }

    let record = documents::store_upload(&state.config, &state.pool, &file_name, &bytes)
        .await
        .map_err(internal)?;

    let background = record.clone();
    let pool = state.pool.clone();
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        match documents::process_document(&pipeline, &pool, &background).await {
            Ok(()) => tracing::info!(document_id = %background.id, "document processed"),
            Err(e) => tracing::error!(
                document_id = %background.id,
                code = e.code(),
                error = %e,
                "background indexing failed"
            ),
        }
    });

    Ok(Json(DocumentResponse::from(&record)))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentResponse>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let records = documents::list_documents(&state.pool)
        .await
        .map_err(internal)?;
    Ok(Json(DocumentListResponse {
        documents: records.iter().map(DocumentResponse::from).collect(),
    }))
}

// ============ GET /documents/{id} ============

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError> {
    let record = documents::get_document(&state.pool, &id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("document not found: {}", id)))?;
    Ok(Json(DocumentResponse::from(&record)))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    document_id: String,
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    context: Vec<RetrievedChunk>,
}

/// Handler for `POST /ask`.
///
/// Builds the document's index first if background indexing has not
/// finished, so a question never races an upload into a missing index.
async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let record = documents::get_document(&state.pool, &request.document_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("document not found: {}", request.document_id)))?;

    let answer = state
        .pipeline
        .answer_question(&record.id, &record.path, &request.question)
        .await?;

    if !record.is_processed() {
        // The question built the index; record it like background indexing would
        if let Err(e) =
            documents::mark_processed(&state.pool, &record.id, chrono::Utc::now().timestamp())
                .await
        {
            tracing::warn!(document_id = %record.id, error = %e, "failed to mark document processed");
        }
    }

    Ok(Json(AskResponse {
        answer: answer.text,
        context: answer.context,
    }))
}
