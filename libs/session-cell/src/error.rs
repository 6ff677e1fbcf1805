use thiserror::Error;

use crate::identifiers::ParticipantId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },

    #[error("Session already has a coach")]
    CoachAlreadyPresent,

    #[error("Session is full (capacity {capacity})")]
    SessionFull { capacity: usize },

    #[error("Session has ended")]
    SessionEnded,

    #[error("Late joins are not allowed for this session")]
    LateJoinNotAllowed,

    #[error("Participant {0} is already in the session")]
    DuplicateParticipant(ParticipantId),

    #[error("Participant {0} is not in the session")]
    ParticipantNotFound(ParticipantId),
}
