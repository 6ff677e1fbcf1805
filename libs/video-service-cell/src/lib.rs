//! # Video Service Cell
//!
//! One capability-described, event-driven contract over three different
//! vendor video SDKs (Zoom-style, Agora-style, mesh WebRTC), so the rest
//! of the system never branches on vendor identity.
//!
//! Each adapter translates vendor payloads into the canonical participant
//! and event shapes at the ingestion point; nothing vendor-specific leaks
//! past this cell. Events flow on five independent, per-stream-ordered
//! broadcast channels that terminate when the service is destroyed.

pub mod error;
pub mod events;
pub mod models;
pub mod service;
pub mod services;
pub mod token;

// Re-export commonly used types
pub use error::VideoServiceError;
pub use events::{
    AudioEvent, ConnectionEvent, EventStreams, ParticipantEvent, ScalingEvent, Timestamped,
    VideoEvent,
};
pub use models::{
    ConnectionState, ConnectionStatistics, JoinSessionRequest, JoinSessionResult, RenderState,
    RenderSurface, SelectiveStreamingConfig, ServiceCapabilities, SessionInfo, VideoQuality,
    VideoServiceConfig,
};
pub use service::VideoService;
pub use services::agora::AgoraVideoService;
pub use services::factory::VideoServiceFactory;
pub use services::webrtc::WebRtcVideoService;
pub use services::zoom::ZoomVideoService;
pub use token::{HmacTokenSigner, JoinTokenSigner, JwtTokenSigner, UnauthenticatedTokens};
