//! Session lifecycle API handlers
//!
//! POST /session, GET /session/{id}, POST /session/{id}/advance,
//! POST /session/{id}/response, POST /session/{id}/complete-level,
//! POST /session/{id}/exit, GET /session/{id}/responses

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use funnel_common::models::{Answer, Response, ResponseType, Session, SessionPhase};

use crate::error::{ApiError, ApiResult};
use crate::lifecycle::ResponsePayload;
use crate::AppState;

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/:session_id", get(get_session))
        .route("/session/:session_id/advance", post(advance_phase))
        .route("/session/:session_id/response", post(record_response))
        .route("/session/:session_id/complete-level", post(complete_level))
        .route("/session/:session_id/exit", post(exit_session))
        .route("/session/:session_id/responses", get(list_responses))
}

/// POST /session request
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub experiment_id: String,
    /// Existing user to resume for; omitted means a new anonymous visitor
    pub user_id: Option<Uuid>,
}

/// POST /session/{id}/advance request
#[derive(Debug, Deserialize)]
pub struct AdvancePhaseRequest {
    pub target: SessionPhase,
    /// Replaces the session-data blob when present
    #[serde(default)]
    pub session_data: Option<serde_json::Value>,
}

/// POST /session/{id}/response request.
/// Textual answers use `text`; file answers carry base64 bytes plus a
/// content type.
#[derive(Debug, Deserialize)]
pub struct RecordResponseRequest {
    pub question_id: String,
    pub response_type: ResponseType,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_base64: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// POST /session/{id}/response response
#[derive(Debug, Serialize)]
pub struct RecordResponseResponse {
    pub response: Response,
    /// Set when the file upload failed; the answer itself is durable and
    /// the UI may offer an upload retry
    pub storage_error: Option<String>,
    /// Set when the customer profile upsert failed (non-blocking)
    pub profile_error: Option<String>,
}

/// POST /session/{id}/complete-level request
#[derive(Debug, Deserialize)]
pub struct CompleteLevelRequest {
    /// Accumulated answers for the current level, as rule evaluation input
    #[serde(default)]
    pub responses: Vec<Answer>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<Session>> {
    if request.experiment_id.is_empty() {
        return Err(ApiError::BadRequest("experiment_id is required".to_string()));
    }

    let session = state
        .lifecycle
        .create_session(&request.experiment_id, request.user_id)
        .await?;

    Ok(Json(session))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Session>> {
    let session = state.lifecycle.get_session(session_id).await?;
    Ok(Json(session))
}

async fn advance_phase(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AdvancePhaseRequest>,
) -> ApiResult<Json<Session>> {
    let session = state
        .lifecycle
        .advance_phase(session_id, request.target, request.session_data)
        .await?;
    Ok(Json(session))
}

async fn record_response(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RecordResponseRequest>,
) -> ApiResult<Json<RecordResponseResponse>> {
    let payload = build_payload(&request)?;

    let outcome = state
        .lifecycle
        .record_response(session_id, &request.question_id, request.response_type, payload)
        .await?;

    Ok(Json(RecordResponseResponse {
        response: outcome.response,
        storage_error: outcome.storage_error,
        profile_error: outcome.profile_error,
    }))
}

fn build_payload(request: &RecordResponseRequest) -> ApiResult<ResponsePayload> {
    if let Some(encoded) = &request.file_base64 {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ApiError::BadRequest(format!("Invalid file_base64: {}", e)))?;
        let content_type = request
            .content_type
            .clone()
            .ok_or_else(|| ApiError::BadRequest("content_type is required with file_base64".to_string()))?;
        return Ok(ResponsePayload::File {
            bytes,
            content_type,
        });
    }

    match &request.text {
        Some(text) => Ok(ResponsePayload::Text(text.clone())),
        None => Err(ApiError::BadRequest(
            "Either text or file_base64 must be provided".to_string(),
        )),
    }
}

async fn complete_level(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CompleteLevelRequest>,
) -> ApiResult<Json<Session>> {
    let session = state
        .lifecycle
        .complete_level(session_id, &request.responses)
        .await?;
    Ok(Json(session))
}

async fn exit_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Session>> {
    let session = state.lifecycle.exit_session(session_id).await?;
    Ok(Json(session))
}

async fn list_responses(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Response>>> {
    let responses = state.lifecycle.list_responses(session_id).await?;
    Ok(Json(responses))
}
