use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use session_cell::{ParticipantId, SessionId};
use shared_models::error::AppError;
use video_service_cell::VideoQuality;

use crate::models::{
    CoordinationError, CreateSessionRequest, JoinRequest, LeaveRequest, MediaUpdateRequest,
    ScalingRequest, SessionView,
};
use crate::services::CoordinatorRegistry;

// Layout budgets for the default grid: up to 4 full tiles, 8 thumbnails,
// everyone else audio-only.
const ACTIVE_BUDGET: usize = 4;
const THUMBNAIL_BUDGET: usize = 8;

fn map_guard(e: session_cell::DomainError) -> AppError {
    use session_cell::DomainError::*;
    match e {
        InvalidIdentifier { .. } => AppError::BadRequest(e.to_string()),
        SessionFull { .. } => AppError::Capacity(e.to_string()),
        ParticipantNotFound(_) => AppError::NotFound(e.to_string()),
        CoachAlreadyPresent | SessionEnded | LateJoinNotAllowed | DuplicateParticipant(_) => {
            AppError::Conflict(e.to_string())
        }
    }
}

fn map_error(e: CoordinationError) -> AppError {
    match e {
        CoordinationError::SessionNotFound => AppError::NotFound("Session not found".to_string()),
        CoordinationError::Guard(domain) => map_guard(domain),
        CoordinationError::Unsupported(what) => AppError::Unsupported(what.to_string()),
        CoordinationError::Service(service) => {
            AppError::ExternalService(format!("video service: {}", service))
        }
        CoordinationError::Store(store) => AppError::Internal(store.to_string()),
        CoordinationError::ShutDown => AppError::Conflict("Session is shut down".to_string()),
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, AppError> {
    SessionId::new(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn parse_participant_id(raw: &str) -> Result<ParticipantId, AppError> {
    ParticipantId::new(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

#[axum::debug_handler]
pub async fn create_session(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let coordinator = registry
        .create_session(
            &request.name,
            request.max_participants,
            request.allow_late_join,
        )
        .await
        .map_err(map_error)?;

    let view = SessionView::from_session(&coordinator.snapshot(), ACTIVE_BUDGET, THUMBNAIL_BUDGET);
    Ok(Json(json!({ "session": view })))
}

#[axum::debug_handler]
pub async fn get_session(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    let view = SessionView::from_session(&coordinator.snapshot(), ACTIVE_BUDGET, THUMBNAIL_BUDGET);
    Ok(Json(json!({
        "session": view,
        "connection_issue": coordinator.connection_issue(),
    })))
}

#[axum::debug_handler]
pub async fn join_session(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    let participant = coordinator.join(request).await.map_err(map_error)?;
    let view = SessionView::from_session(&coordinator.snapshot(), ACTIVE_BUDGET, THUMBNAIL_BUDGET);
    Ok(Json(json!({
        "participant_id": participant.id().as_str(),
        "session": view,
    })))
}

#[axum::debug_handler]
pub async fn leave_session(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
    Json(request): Json<LeaveRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let participant_id = parse_participant_id(&request.participant_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    coordinator.leave(&participant_id).await.map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn update_media(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
    Json(request): Json<MediaUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let participant_id = parse_participant_id(&request.participant_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    coordinator
        .set_media(&participant_id, request.video, request.audio)
        .await
        .map_err(map_error)?;

    let view = SessionView::from_session(&coordinator.snapshot(), ACTIVE_BUDGET, THUMBNAIL_BUDGET);
    Ok(Json(json!({ "session": view })))
}

#[axum::debug_handler]
pub async fn spotlight_participant(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path((session_id, participant_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let participant_id = parse_participant_id(&participant_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    coordinator
        .spotlight(&participant_id)
        .await
        .map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn clear_spotlight(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    coordinator.clear_spotlight().await.map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn mute_participant(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path((session_id, participant_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let participant_id = parse_participant_id(&participant_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    coordinator.mute(&participant_id).await.map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn remove_participant(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path((session_id, participant_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let participant_id = parse_participant_id(&participant_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    coordinator.remove(&participant_id).await.map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn end_session(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    coordinator.end().await.map_err(map_error)?;
    registry.drop_session(&id).await.map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn session_statistics(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    let stats = coordinator.statistics().await.map_err(map_error)?;
    Ok(Json(json!({ "statistics": stats })))
}

#[axum::debug_handler]
pub async fn set_video_quality(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    let quality: VideoQuality = serde_json::from_value(body["quality"].clone())
        .map_err(|_| AppError::BadRequest("quality must be low, medium or high".to_string()))?;
    coordinator
        .set_video_quality(quality)
        .await
        .map_err(map_error)?;
    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn apply_scaling(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(session_id): Path<String>,
    Json(request): Json<ScalingRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_session_id(&session_id)?;
    let coordinator = registry.get(&id).await.map_err(map_error)?;

    let plan = coordinator
        .apply_scaling(
            request.active_budget,
            request.thumbnail_budget,
            request.video_limit,
            request.audio_only,
        )
        .await
        .map_err(map_error)?;
    Ok(Json(json!({ "stream_plan": plan })))
}

/// Vendor push channel. Malformed payloads are dropped inside the
/// adapters, so this endpoint always acknowledges.
#[axum::debug_handler]
pub async fn ingest_vendor_event(
    State(registry): State<Arc<CoordinatorRegistry>>,
    Path(provider): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let configured = registry.factory().provider().as_str();
    if provider != configured {
        return Err(AppError::BadRequest(format!(
            "provider {} is not configured (expected {})",
            provider, configured
        )));
    }

    registry.ingest_vendor_event(payload).await;
    Ok(Json(json!({ "accepted": true })))
}

#[axum::debug_handler]
pub async fn video_health_check(
    State(registry): State<Arc<CoordinatorRegistry>>,
) -> Json<Value> {
    let caps = registry.factory().capabilities();
    Json(json!({
        "status": "healthy",
        "provider": caps.provider,
        "active_sessions": registry.active_session_ids().await.len(),
        "capabilities": caps,
    }))
}
