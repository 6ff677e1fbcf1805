use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::DomainError;
use crate::identifiers::{ParticipantId, SessionId};
use crate::participant::{Participant, ParticipantRole};

/// Upper bound on active speakers granted priority placement.
const ACTIVE_SPEAKER_CAP: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "ended")]
    Ended,
}

/// Disjoint participant sets handed to selective streaming: full-quality
/// tiles, thumbnails, and audio-only subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPlan {
    pub active: Vec<ParticipantId>,
    pub thumbnail: Vec<ParticipantId>,
    pub audio_only: Vec<ParticipantId>,
}

/// Aggregate root for one live class. All mutations are pure transitions
/// returning a new aggregate value; a guard violation leaves the previous
/// value untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSession {
    id: SessionId,
    name: String,
    status: SessionStatus,
    participants: HashMap<ParticipantId, Participant>,
    coach_id: Option<ParticipantId>,
    spotlighted_participant_id: Option<ParticipantId>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    max_participants: usize,
    allow_late_join: bool,
}

impl VideoSession {
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        max_participants: usize,
        allow_late_join: bool,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            status: SessionStatus::Waiting,
            participants: HashMap::new(),
            coach_id: None,
            spotlighted_participant_id: None,
            started_at: None,
            ended_at: None,
            max_participants,
            allow_late_join,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn max_participants(&self) -> usize {
        self.max_participants
    }

    pub fn allow_late_join(&self) -> bool {
        self.allow_late_join
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    pub fn coach(&self) -> Option<&Participant> {
        self.coach_id.as_ref().and_then(|id| self.participants.get(id))
    }

    pub fn coach_id(&self) -> Option<&ParticipantId> {
        self.coach_id.as_ref()
    }

    pub fn spotlighted_participant(&self) -> Option<&Participant> {
        self.spotlighted_participant_id
            .as_ref()
            .and_then(|id| self.participants.get(id))
    }

    pub fn spotlighted_participant_id(&self) -> Option<&ParticipantId> {
        self.spotlighted_participant_id.as_ref()
    }

    /// All join guards in one place, so a caller gets a single rejection
    /// reason instead of partial validation.
    pub fn can_add_participant(&self, participant: &Participant) -> Result<(), DomainError> {
        if self.status == SessionStatus::Ended {
            return Err(DomainError::SessionEnded);
        }
        if self.participants.contains_key(participant.id()) {
            return Err(DomainError::DuplicateParticipant(participant.id().clone()));
        }
        if self.participants.len() >= self.max_participants {
            return Err(DomainError::SessionFull {
                capacity: self.max_participants,
            });
        }
        if participant.role() == ParticipantRole::Coach && self.coach_id.is_some() {
            return Err(DomainError::CoachAlreadyPresent);
        }
        if self.status == SessionStatus::Active
            && !self.allow_late_join
            && participant.role() == ParticipantRole::Student
        {
            return Err(DomainError::LateJoinNotAllowed);
        }
        Ok(())
    }

    pub fn add_participant(&self, participant: Participant) -> Result<Self, DomainError> {
        self.can_add_participant(&participant)?;

        let mut next = self.clone();
        if participant.role() == ParticipantRole::Coach {
            next.coach_id = Some(participant.id().clone());
            if next.status == SessionStatus::Waiting {
                next.status = SessionStatus::Active;
                next.started_at = Some(Utc::now());
            }
        }
        next.participants
            .insert(participant.id().clone(), participant);
        Ok(next)
    }

    /// Removes a participant. Removing the coach ends the session; there
    /// is no coach hand-off. Removing the spotlighted participant clears
    /// the spotlight.
    pub fn remove_participant(&self, id: &ParticipantId) -> Result<Self, DomainError> {
        if !self.participants.contains_key(id) {
            return Err(DomainError::ParticipantNotFound(id.clone()));
        }

        let mut next = self.clone();
        next.participants.remove(id);

        if next.spotlighted_participant_id.as_ref() == Some(id) {
            next.spotlighted_participant_id = None;
        }
        if next.coach_id.as_ref() == Some(id) {
            next.coach_id = None;
            if next.status != SessionStatus::Ended {
                next.status = SessionStatus::Ended;
                next.ended_at = Some(Utc::now());
            }
        }
        Ok(next)
    }

    /// Applies a pure transition to one participant.
    pub fn update_participant<F>(&self, id: &ParticipantId, transition: F) -> Result<Self, DomainError>
    where
        F: FnOnce(&Participant) -> Participant,
    {
        let current = self
            .participants
            .get(id)
            .ok_or_else(|| DomainError::ParticipantNotFound(id.clone()))?;

        let mut next = self.clone();
        next.participants.insert(id.clone(), transition(current));
        Ok(next)
    }

    pub fn spotlight_participant(&self, id: &ParticipantId) -> Result<Self, DomainError> {
        if self.status == SessionStatus::Ended {
            return Err(DomainError::SessionEnded);
        }
        if !self.participants.contains_key(id) {
            return Err(DomainError::ParticipantNotFound(id.clone()));
        }

        let mut next = self.clone();
        next.spotlighted_participant_id = Some(id.clone());
        Ok(next)
    }

    /// Idempotent: clearing an absent spotlight is a no-op.
    pub fn clear_spotlight(&self) -> Self {
        let mut next = self.clone();
        next.spotlighted_participant_id = None;
        next
    }

    /// Explicit end. Ended is absorbing, so ending twice is a no-op.
    pub fn end(&self) -> Self {
        if self.status == SessionStatus::Ended {
            return self.clone();
        }
        let mut next = self.clone();
        next.status = SessionStatus::Ended;
        next.ended_at = Some(Utc::now());
        next
    }

    // ---- priority, pagination, stream planning ----------------------------

    /// Participants in arrival order (joined_at, id tiebreak).
    pub fn participants_by_arrival(&self) -> Vec<&Participant> {
        let mut all: Vec<&Participant> = self.participants.values().collect();
        all.sort_by(|a, b| {
            a.joined_at()
                .cmp(&b.joined_at())
                .then_with(|| a.id().as_str().cmp(b.id().as_str()))
        });
        all
    }

    /// Total render priority order, identical regardless of vendor:
    /// coach, then spotlight, then active speakers (capped), then raised
    /// hands, then participants with media on, then the rest by arrival.
    pub fn priority_order(&self) -> Vec<&Participant> {
        let arrival = self.participants_by_arrival();
        let mut ordered: Vec<&Participant> = Vec::with_capacity(arrival.len());
        let mut placed: HashSet<ParticipantId> = HashSet::new();

        if let Some(coach) = self.coach() {
            placed.insert(coach.id().clone());
            ordered.push(coach);
        }
        if let Some(spotlighted) = self.spotlighted_participant() {
            if placed.insert(spotlighted.id().clone()) {
                ordered.push(spotlighted);
            }
        }

        let mut speakers = 0usize;
        for p in arrival.iter().filter(|p| p.is_active_speaker()) {
            if speakers >= ACTIVE_SPEAKER_CAP {
                break;
            }
            if placed.insert(p.id().clone()) {
                ordered.push(*p);
                speakers += 1;
            }
        }

        for p in arrival.iter().filter(|p| p.has_raised_hand()) {
            if placed.insert(p.id().clone()) {
                ordered.push(*p);
            }
        }
        for p in arrival.iter().filter(|p| p.has_media_enabled()) {
            if placed.insert(p.id().clone()) {
                ordered.push(*p);
            }
        }
        for p in &arrival {
            if placed.insert(p.id().clone()) {
                ordered.push(*p);
            }
        }

        ordered
    }

    /// First `budget` participants of the priority order.
    pub fn select_high_priority(&self, budget: usize) -> Vec<ParticipantId> {
        self.priority_order()
            .into_iter()
            .take(budget)
            .map(|p| p.id().clone())
            .collect()
    }

    /// One render page over the priority order, for grids that cannot
    /// show every participant at once.
    pub fn page(&self, index: usize, size: usize) -> Vec<&Participant> {
        if size == 0 {
            return Vec::new();
        }
        self.priority_order()
            .into_iter()
            .skip(index.saturating_mul(size))
            .take(size)
            .collect()
    }

    pub fn page_count(&self, size: usize) -> usize {
        if size == 0 {
            0
        } else {
            self.participants.len().div_ceil(size)
        }
    }

    /// Splits the priority order into the three disjoint selective
    /// streaming sets.
    pub fn stream_plan(&self, active_budget: usize, thumbnail_budget: usize) -> StreamPlan {
        let ordered = self.priority_order();
        let mut active = Vec::new();
        let mut thumbnail = Vec::new();
        let mut audio_only = Vec::new();

        for (index, participant) in ordered.iter().enumerate() {
            let id = participant.id().clone();
            if index < active_budget {
                active.push(id);
            } else if index < active_budget + thumbnail_budget {
                thumbnail.push(id);
            } else {
                audio_only.push(id);
            }
        }

        StreamPlan {
            active,
            thumbnail,
            audio_only,
        }
    }
}
