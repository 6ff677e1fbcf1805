use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::identifiers::ParticipantId;
use crate::quality::ConnectionQuality;

/// A participant is considered inactive after this much idle time.
const INACTIVITY_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantRole {
    #[serde(rename = "coach")]
    Coach,
    #[serde(rename = "student")]
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaState {
    #[serde(rename = "enabled")]
    Enabled,
    #[serde(rename = "disabled")]
    Disabled,
}

impl MediaState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, MediaState::Enabled)
    }
}

/// One person's presence in a live class. The id and role are fixed for
/// the entity's lifetime; every state change returns a new value, so any
/// previously handed-out snapshot stays valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    id: ParticipantId,
    name: String,
    role: ParticipantRole,
    video_state: MediaState,
    audio_state: MediaState,
    connection_quality: ConnectionQuality,
    joined_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    is_active_speaker: bool,
    has_raised_hand: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>, role: ParticipantRole) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into().trim().to_string(),
            role,
            video_state: MediaState::Disabled,
            audio_state: MediaState::Disabled,
            connection_quality: ConnectionQuality::Unknown,
            joined_at: now,
            last_activity: now,
            is_active_speaker: false,
            has_raised_hand: false,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ParticipantRole {
        self.role
    }

    pub fn video_state(&self) -> MediaState {
        self.video_state
    }

    pub fn audio_state(&self) -> MediaState {
        self.audio_state
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        self.connection_quality
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn is_active_speaker(&self) -> bool {
        self.is_active_speaker
    }

    pub fn has_raised_hand(&self) -> bool {
        self.has_raised_hand
    }

    pub fn is_coach(&self) -> bool {
        self.role == ParticipantRole::Coach
    }

    pub fn can_control_others(&self) -> bool {
        self.role == ParticipantRole::Coach
    }

    pub fn has_media_enabled(&self) -> bool {
        self.video_state.is_enabled() || self.audio_state.is_enabled()
    }

    pub fn is_inactive(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity > Duration::minutes(INACTIVITY_WINDOW_MINUTES)
    }

    // ---- pure transitions -------------------------------------------------

    pub fn with_video(&self, state: MediaState) -> Self {
        Self {
            video_state: state,
            last_activity: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_audio(&self, state: MediaState) -> Self {
        Self {
            audio_state: state,
            last_activity: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_connection_quality(&self, quality: ConnectionQuality) -> Self {
        Self {
            connection_quality: quality,
            ..self.clone()
        }
    }

    pub fn with_active_speaker(&self, speaking: bool) -> Self {
        Self {
            is_active_speaker: speaking,
            last_activity: if speaking { Utc::now() } else { self.last_activity },
            ..self.clone()
        }
    }

    pub fn with_raised_hand(&self, raised: bool) -> Self {
        Self {
            has_raised_hand: raised,
            last_activity: Utc::now(),
            ..self.clone()
        }
    }

    /// Periodic activity stamp.
    pub fn touched(&self) -> Self {
        Self {
            last_activity: Utc::now(),
            ..self.clone()
        }
    }

    // ---- snapshots --------------------------------------------------------

    pub fn to_snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            id: self.id.to_string(),
            name: self.name.clone(),
            role: self.role,
            video_state: self.video_state,
            audio_state: self.audio_state,
            connection_quality: self.connection_quality,
            is_active_speaker: self.is_active_speaker,
            has_raised_hand: self.has_raised_hand,
        }
    }

    /// Rebuilds a participant from a stored snapshot. Timestamps are
    /// refreshed rather than carried over.
    pub fn from_snapshot(snapshot: &ParticipantSnapshot) -> Result<Self, DomainError> {
        let id = ParticipantId::new(snapshot.id.clone())?;
        let now = Utc::now();
        Ok(Self {
            id,
            name: snapshot.name.clone(),
            role: snapshot.role,
            video_state: snapshot.video_state,
            audio_state: snapshot.audio_state,
            connection_quality: snapshot.connection_quality,
            joined_at: now,
            last_activity: now,
            is_active_speaker: snapshot.is_active_speaker,
            has_raised_hand: snapshot.has_raised_hand,
        })
    }
}

/// Durable representation of a participant's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub id: String,
    pub name: String,
    pub role: ParticipantRole,
    pub video_state: MediaState,
    pub audio_state: MediaState,
    pub connection_quality: ConnectionQuality,
    pub is_active_speaker: bool,
    pub has_raised_hand: bool,
}
