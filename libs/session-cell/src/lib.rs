//! # Session Cell
//!
//! Domain layer for live fitness classes: validated identifiers, the
//! immutable `Participant` entity, and the `VideoSession` aggregate that
//! owns the coach/spotlight/capacity invariants plus the pagination and
//! priority algorithms used at scale.
//!
//! Every state change is a pure transition returning a new value, so UI
//! readers always hold valid snapshots and the event fold in the
//! coordination cell needs no locking.

pub mod error;
pub mod identifiers;
pub mod participant;
pub mod quality;
pub mod session;

// Re-export commonly used types
pub use error::DomainError;
pub use identifiers::{ParticipantId, SessionId};
pub use participant::{MediaState, Participant, ParticipantRole, ParticipantSnapshot};
pub use quality::ConnectionQuality;
pub use session::{SessionStatus, StreamPlan, VideoSession};
