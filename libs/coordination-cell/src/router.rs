use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::*;
use crate::services::CoordinatorRegistry;

/// Session coordination routes, mounted under `/video` by the API
/// binary.
pub fn coordination_routes(registry: Arc<CoordinatorRegistry>) -> Router {
    Router::new()
        .route("/health", get(video_health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/sessions/{session_id}", delete(end_session))
        .route("/sessions/{session_id}/join", post(join_session))
        .route("/sessions/{session_id}/leave", post(leave_session))
        .route("/sessions/{session_id}/media", post(update_media))
        .route("/sessions/{session_id}/quality", put(set_video_quality))
        .route(
            "/sessions/{session_id}/spotlight/{participant_id}",
            post(spotlight_participant),
        )
        .route("/sessions/{session_id}/spotlight", delete(clear_spotlight))
        .route(
            "/sessions/{session_id}/participants/{participant_id}/mute",
            post(mute_participant),
        )
        .route(
            "/sessions/{session_id}/participants/{participant_id}",
            delete(remove_participant),
        )
        .route(
            "/sessions/{session_id}/statistics",
            get(session_statistics),
        )
        .route("/sessions/{session_id}/scaling", post(apply_scaling))
        .route("/events/{provider}", post(ingest_vendor_event))
        .with_state(registry)
}
