//! # Coordination Cell
//!
//! Binds a live class session together: one coordinator per session owns
//! the video service, folds its five event streams into an observable
//! `VideoSession` snapshot, polls connection statistics, and exposes the
//! command surface over HTTP.
//!
//! ```text
//! +---------------------------------------------------------+
//! |                  Coordination Cell                      |
//! +---------------------------------------------------------+
//! |  handlers.rs       |  HTTP endpoint handlers            |
//! |  router.rs         |  Route definitions                 |
//! |  models.rs         |  DTOs, read models, cell errors    |
//! |  services/         |  Business logic layer              |
//! |    coordinator.rs  |  Event fold + command surface      |
//! |    registry.rs     |  Live coordinators by session id   |
//! |    store.rs        |  Session persistence port          |
//! +---------------------------------------------------------+
//! ```
//!
//! Commands go vendor-first: the service call must succeed before the
//! local aggregate folds, so the snapshot never claims something the
//! vendor refused. Remote events flow the other way and fold with
//! guard-violation tolerance, because vendor pushes can arrive late,
//! duplicated, or for participants already gone.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    ConnectionIssue, CoordinationError, CreateSessionRequest, JoinRequest, LeaveRequest,
    MediaUpdateRequest, ParticipantView, ScalingRequest, SessionBroadcast, SessionView,
};
pub use router::coordination_routes;
pub use services::{CoordinatorRegistry, SessionCoordinator, SessionStore};
