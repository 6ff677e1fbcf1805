use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use session_cell::{
    DomainError, Participant, ParticipantRole, SessionStatus, StreamPlan, VideoSession,
};
use video_service_cell::{ConnectionState, VideoServiceError};

/// Cell-level failure taxonomy. Handlers translate this into the shared
/// HTTP error type at the boundary.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("session not found")]
    SessionNotFound,

    #[error("{0}")]
    Guard(#[from] DomainError),

    #[error("video service error: {0}")]
    Service(#[from] VideoServiceError),

    #[error("provider does not support {0}")]
    Unsupported(&'static str),

    #[error("session store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("coordinator is shut down")]
    ShutDown,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub max_participants: Option<usize>,
    #[serde(default)]
    pub allow_late_join: bool,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub participant_name: String,
    pub role: ParticipantRole,
    #[serde(default)]
    pub video_enabled: bool,
    #[serde(default)]
    pub audio_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub participant_id: String,
}

/// Media toggles for one participant. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct MediaUpdateRequest {
    pub participant_id: String,
    pub video: Option<bool>,
    pub audio: Option<bool>,
}

/// Scaling plan parameters. Budgets bound the full-quality and
/// thumbnail tiers; everyone else is subscribed audio-only.
#[derive(Debug, Deserialize)]
pub struct ScalingRequest {
    pub active_budget: usize,
    pub thumbnail_budget: usize,
    pub video_limit: Option<usize>,
    #[serde(default)]
    pub audio_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ParticipantView {
    pub id: String,
    pub name: String,
    pub role: ParticipantRole,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub is_active_speaker: bool,
    pub has_raised_hand: bool,
    pub joined_at: DateTime<Utc>,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id().to_string(),
            name: p.name().to_string(),
            role: p.role(),
            video_enabled: p.video_state().is_enabled(),
            audio_enabled: p.audio_state().is_enabled(),
            is_active_speaker: p.is_active_speaker(),
            has_raised_hand: p.has_raised_hand(),
            joined_at: p.joined_at(),
        }
    }
}

/// Read model of a coordinated session, in arrival order.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub name: String,
    pub status: SessionStatus,
    pub participant_count: usize,
    pub max_participants: usize,
    pub coach_id: Option<String>,
    pub spotlighted_participant_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub participants: Vec<ParticipantView>,
    pub stream_plan: StreamPlan,
}

impl SessionView {
    pub fn from_session(session: &VideoSession, active_budget: usize, thumbnail_budget: usize) -> Self {
        Self {
            id: session.id().to_string(),
            name: session.name().to_string(),
            status: session.status(),
            participant_count: session.participant_count(),
            max_participants: session.max_participants(),
            coach_id: session.coach_id().map(|id| id.to_string()),
            spotlighted_participant_id: session
                .spotlighted_participant_id()
                .map(|id| id.to_string()),
            started_at: session.started_at(),
            ended_at: session.ended_at(),
            participants: session
                .participants_by_arrival()
                .into_iter()
                .map(ParticipantView::from)
                .collect(),
            stream_plan: session.stream_plan(active_budget, thumbnail_budget),
        }
    }
}

/// Observable degraded-connection state. Set when the transport reports
/// trouble; cleared when it recovers. Never tears the session down.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionIssue {
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
}

impl ConnectionIssue {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            since: Utc::now(),
        }
    }
}

/// Wire event fanned out to other clients over the realtime hub.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionBroadcast {
    ParticipantJoined { session_id: String, participant_id: String },
    ParticipantLeft { session_id: String, participant_id: String },
    StatusChanged { session_id: String, status: SessionStatus },
    SpotlightChanged { session_id: String, participant_id: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_cell::{MediaState, ParticipantId, SessionId};

    #[test]
    fn session_view_lists_participants_in_arrival_order() {
        let session = VideoSession::new(SessionId::new("s1").unwrap(), "Morning Flow", 10, true);
        let coach = Participant::new(
            ParticipantId::new("a").unwrap(),
            "Sarah",
            ParticipantRole::Coach,
        );
        let student = Participant::new(
            ParticipantId::new("b").unwrap(),
            "Alex",
            ParticipantRole::Student,
        )
        .with_video(MediaState::Enabled);

        let session = session.add_participant(coach).unwrap();
        let session = session.add_participant(student).unwrap();

        let view = SessionView::from_session(&session, 4, 8);
        assert_eq!(view.participant_count, 2);
        assert_eq!(view.participants[0].id, "a");
        assert_eq!(view.participants[1].id, "b");
        assert!(view.participants[1].video_enabled);
    }

    #[test]
    fn broadcast_events_serialize_with_a_type_tag() {
        let event = SessionBroadcast::StatusChanged {
            session_id: "s1".to_string(),
            status: SessionStatus::Active,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
    }
}
