use super::state::AppState;
use crate::chat::{ChatEntry, ChatSession};
use crate::coordination::FinalRecord;
use crate::error::DictationError;
use crate::session::StartOutcome;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StartDictationResponse {
    /// "started" or "already_active"
    pub status: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopDictationResponse {
    /// False when no session was active
    pub stopping: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DictationStatusResponse {
    pub active: bool,
    pub session_id: Option<String>,
    pub partial: Option<String>,
    pub stt_available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(e: DictationError) -> Response {
    let status = match &e {
        DictationError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DictationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DictationError::Downstream(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /dictation/start
/// Start a session unless one is already active
pub async fn start_dictation(State(state): State<AppState>) -> Response {
    match state.controller.start() {
        Ok(StartOutcome::Started(session_id)) => {
            info!("Dictation started via HTTP: {}", session_id);
            (
                StatusCode::OK,
                Json(StartDictationResponse {
                    status: "started".to_string(),
                    session_id: Some(session_id.to_string()),
                }),
            )
                .into_response()
        }
        Ok(StartOutcome::AlreadyActive) => (
            StatusCode::OK,
            Json(StartDictationResponse {
                status: "already_active".to_string(),
                session_id: None,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /dictation/stop
pub async fn stop_dictation(State(state): State<AppState>) -> Response {
    match state.controller.request_stop() {
        Ok(stopping) => (StatusCode::OK, Json(StopDictationResponse { stopping })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /dictation/status
pub async fn dictation_status(State(state): State<AppState>) -> Response {
    let controller = &state.controller;
    let status = match controller.status() {
        Ok(status) => status,
        Err(e) => return error_response(e),
    };
    let partial = match controller.poll_partial() {
        Ok(partial) => partial,
        Err(e) => return error_response(e),
    };

    (
        StatusCode::OK,
        Json(DictationStatusResponse {
            active: status.is_some(),
            session_id: status.map(|s| s.session_id.to_string()),
            partial,
            stt_available: controller.stt_available(),
        }),
    )
        .into_response()
}

/// GET /dictation/result
/// Take the final result; 204 when none is waiting
pub async fn dictation_result(State(state): State<AppState>) -> Response {
    match state.controller.poll_final() {
        Ok(Some(record)) => (StatusCode::OK, Json::<FinalRecord>(record)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /chat/ask
/// Collaborator failures come back as an entry with `is_error` set
pub async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Response {
    // The history stays readable while the collaborator answers.
    let service = state.chat.lock().await.service();
    let entry = match ChatSession::answer(service.as_ref(), &req.question).await {
        Ok(entry) => entry,
        Err(e) => return error_response(e),
    };

    let mut chat = state.chat.lock().await;
    match chat.record(entry.clone()) {
        Ok(()) => (StatusCode::OK, Json::<ChatEntry>(entry)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /chat/history
pub async fn chat_history(State(state): State<AppState>) -> Response {
    let chat = state.chat.lock().await;
    (StatusCode::OK, Json(chat.history().entries().to_vec())).into_response()
}

/// DELETE /chat/history
pub async fn clear_chat_history(State(state): State<AppState>) -> Response {
    let mut chat = state.chat.lock().await;
    match chat.clear_history() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
