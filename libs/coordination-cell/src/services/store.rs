use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use session_cell::{Participant, SessionId, VideoSession};
use shared_database::{BackendClient, RealtimeHub};

use crate::models::SessionBroadcast;

/// Persistence port for session state. The coordinator only needs three
/// writes; reads go straight to the backend's query surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert_session(&self, session: &VideoSession) -> Result<()>;
    async fn record_join(&self, session_id: &SessionId, participant: &Participant) -> Result<()>;
    async fn record_leave(&self, session_id: &SessionId, participant_id: &str) -> Result<()>;
}

/// REST-backed store. Rows are upserted through the backend's
/// `/rest/v1` surface and every write fans out over the realtime hub so
/// other clients converge without polling.
pub struct RestSessionStore {
    backend: BackendClient,
    realtime: Arc<RealtimeHub>,
}

impl RestSessionStore {
    pub fn new(backend: BackendClient, realtime: Arc<RealtimeHub>) -> Self {
        Self { backend, realtime }
    }

    async fn broadcast(&self, session_id: &SessionId, event: &SessionBroadcast) {
        match serde_json::to_string(event) {
            Ok(payload) => self.realtime.publish(session_id.as_str(), payload).await,
            Err(e) => warn!("Failed to serialize session broadcast: {}", e),
        }
    }
}

#[async_trait]
impl SessionStore for RestSessionStore {
    async fn upsert_session(&self, session: &VideoSession) -> Result<()> {
        debug!("Upserting session {} ({:?})", session.id(), session.status());

        let body = json!({
            "id": session.id().as_str(),
            "name": session.name(),
            "status": session.status(),
            "participant_count": session.participant_count(),
            "max_participants": session.max_participants(),
            "coach_id": session.coach_id().map(|id| id.as_str()),
            "started_at": session.started_at(),
            "ended_at": session.ended_at(),
        });
        let _: Value = self
            .backend
            .request(
                Method::POST,
                "/rest/v1/video_sessions?on_conflict=id",
                Some(body),
            )
            .await?;

        self.broadcast(
            session.id(),
            &SessionBroadcast::StatusChanged {
                session_id: session.id().to_string(),
                status: session.status(),
            },
        )
        .await;
        Ok(())
    }

    async fn record_join(&self, session_id: &SessionId, participant: &Participant) -> Result<()> {
        let body = json!({
            "session_id": session_id.as_str(),
            "participant_id": participant.id().as_str(),
            "name": participant.name(),
            "role": participant.role(),
            "joined_at": participant.joined_at(),
        });
        let _: Value = self
            .backend
            .request(
                Method::POST,
                "/rest/v1/session_participants?on_conflict=session_id,participant_id",
                Some(body),
            )
            .await?;

        self.broadcast(
            session_id,
            &SessionBroadcast::ParticipantJoined {
                session_id: session_id.to_string(),
                participant_id: participant.id().to_string(),
            },
        )
        .await;
        Ok(())
    }

    async fn record_leave(&self, session_id: &SessionId, participant_id: &str) -> Result<()> {
        let path = format!(
            "/rest/v1/session_participants?session_id=eq.{}&participant_id=eq.{}",
            session_id, participant_id
        );
        let _: Value = self
            .backend
            .request(
                Method::PATCH,
                &path,
                Some(json!({ "left_at": chrono::Utc::now() })),
            )
            .await?;

        self.broadcast(
            session_id,
            &SessionBroadcast::ParticipantLeft {
                session_id: session_id.to_string(),
                participant_id: participant_id.to_string(),
            },
        )
        .await;
        Ok(())
    }
}

/// Store used when no backend is configured. Session state then lives
/// only in the coordinator's snapshot.
pub struct NullSessionStore;

#[async_trait]
impl SessionStore for NullSessionStore {
    async fn upsert_session(&self, _session: &VideoSession) -> Result<()> {
        Ok(())
    }

    async fn record_join(&self, _session_id: &SessionId, _participant: &Participant) -> Result<()> {
        Ok(())
    }

    async fn record_leave(&self, _session_id: &SessionId, _participant_id: &str) -> Result<()> {
        Ok(())
    }
}
