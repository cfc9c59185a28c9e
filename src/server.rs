//! HTTP API for the chat service.
//!
//! A thin JSON layer over [`ChatService`]; all correctness rules live in
//! the service. Errors use a uniform body:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "…" } }
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chats` | Create a session (optional name) |
//! | `GET`  | `/chats` | List session ids |
//! | `POST` | `/chats/{id}/documents` | Upload PDFs (multipart) and index them |
//! | `POST` | `/chats/{id}/messages` | Ask a question |
//! | `GET`  | `/chats/{id}/history` | Load the conversation log |
//! | `POST` | `/chats/rename` | Rename a session |
//! | `POST` | `/clear` | Delete all sessions and data |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::ServiceError;
use crate::models::{ChatMessage, ChunkMeta};
use crate::service::ChatService;

#[derive(Clone)]
struct AppState {
    service: Arc<ChatService>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(service: Arc<ChatService>) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let state = AppState { service };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/chats", post(handle_create_chat).get(handle_list_chats))
        .route("/chats/rename", post(handle_rename_chat))
        .route("/chats/{id}/documents", post(handle_upload_documents))
        .route("/chats/{id}/messages", post(handle_ask))
        .route("/chats/{id}/history", get(handle_history))
        .route("/clear", post(handle_clear_all))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("docchat server listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        let (status, code) = match err {
            ServiceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ServiceError::RetrievalUnavailable(_) => (StatusCode::BAD_REQUEST, "no_documents"),
            ServiceError::GenerationFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed")
            }
            ServiceError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message,
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
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

// ============ POST /chats ============

#[derive(Deserialize, Default)]
struct CreateChatRequest {
    chat_name: Option<String>,
}

#[derive(Serialize)]
struct CreateChatResponse {
    chat_id: String,
}

async fn handle_create_chat(
    State(state): State<AppState>,
    body: Option<Json<CreateChatRequest>>,
) -> Result<(StatusCode, Json<CreateChatResponse>), AppError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let chat_id = state.service.create(req.chat_name.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(CreateChatResponse { chat_id })))
}

// ============ GET /chats ============

#[derive(Serialize)]
struct ListChatsResponse {
    chat_ids: Vec<String>,
}

async fn handle_list_chats(
    State(state): State<AppState>,
) -> Result<Json<ListChatsResponse>, AppError> {
    let chat_ids = state.service.list()?;
    Ok(Json(ListChatsResponse { chat_ids }))
}

// ============ POST /chats/{id}/documents ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    files_indexed: usize,
    files_skipped: usize,
    chunks_committed: usize,
}

async fn handle_upload_documents(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    state.service.ensure_session(&chat_id).await?;

    let mut stored = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        if filename.is_empty() {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        let path = state.service.store_upload(&chat_id, &filename, &bytes)?;
        stored.push(path);
    }

    if stored.is_empty() {
        return Err(bad_request("no files provided"));
    }

    let report = state.service.index_documents(&chat_id, &stored).await?;
    Ok(Json(UploadResponse {
        message: format!("documents uploaded and indexed for chat {}", chat_id),
        files_indexed: report.files_indexed,
        files_skipped: report.files_skipped,
        chunks_committed: report.chunks_committed,
    }))
}

// ============ POST /chats/{id}/messages ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<ChunkMeta>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let answer = state.service.ask(&chat_id, &req.question).await?;
    Ok(Json(AskResponse {
        answer: answer.answer,
        sources: answer.sources,
    }))
}

// ============ GET /chats/{id}/history ============

#[derive(Serialize)]
struct HistoryResponse {
    chat_history: Vec<ChatMessage>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let chat_history = state.service.load_history(&chat_id).await?;
    Ok(Json(HistoryResponse { chat_history }))
}

// ============ POST /chats/rename ============

#[derive(Deserialize)]
struct RenameRequest {
    old_chat_id: String,
    new_chat_name: String,
}

#[derive(Serialize)]
struct RenameResponse {
    message: String,
    new_chat_id: String,
}

async fn handle_rename_chat(
    State(state): State<AppState>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, AppError> {
    if req.old_chat_id.is_empty() || req.new_chat_name.is_empty() {
        return Err(bad_request("missing old_chat_id or new_chat_name"));
    }
    let new_chat_id = state
        .service
        .rename(&req.old_chat_id, &req.new_chat_name)
        .await?;
    Ok(Json(RenameResponse {
        message: "chat renamed successfully".to_string(),
        new_chat_id,
    }))
}

// ============ POST /clear ============

#[derive(Serialize)]
struct ClearResponse {
    message: String,
}

async fn handle_clear_all(
    State(state): State<AppState>,
) -> Result<Json<ClearResponse>, AppError> {
    state.service.clear_all().await?;
    Ok(Json(ClearResponse {
        message: "all chat history, uploaded files, and document indexes have been cleared"
            .to_string(),
    }))
}
