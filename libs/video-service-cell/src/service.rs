use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use session_cell::ParticipantId;

use crate::error::VideoServiceError;
use crate::events::EventStreams;
use crate::models::{
    ConnectionStatistics, JoinSessionRequest, JoinSessionResult, RenderState, RenderSurface,
    SelectiveStreamingConfig, ServiceCapabilities, VideoQuality,
};

/// The vendor-agnostic video service port. All adapters implement exactly
/// this contract; callers gate features on `capabilities()` instead of
/// branching on vendor identity.
#[async_trait]
pub trait VideoService: Send + Sync {
    /// Static capability descriptor for the active adapter.
    fn capabilities(&self) -> ServiceCapabilities;

    /// Handle to the five unified event streams.
    fn events(&self) -> Arc<EventStreams>;

    /// Establishes vendor SDK state. Idempotent-safe for a single adapter
    /// lifetime; fails with `Initialization` when the vendor endpoint is
    /// unreachable or configuration is incomplete.
    async fn initialize(&self) -> Result<(), VideoServiceError>;

    /// Releases local media, closes vendor connections, and terminates all
    /// event streams. Safe to call even if never initialized, and safe
    /// concurrently with in-flight operations, whose late completions are
    /// discarded.
    async fn destroy(&self) -> Result<(), VideoServiceError>;

    /// Joins a session; the local participant is built from the
    /// vendor-assigned identifier, normalized into `ParticipantId`.
    async fn join_session(
        &self,
        request: JoinSessionRequest,
    ) -> Result<JoinSessionResult, VideoServiceError>;

    /// Inverse of join. Does not fail on already-left state.
    async fn leave_session(&self) -> Result<(), VideoServiceError>;

    // ---- local media controls --------------------------------------------

    async fn enable_video(&self) -> Result<(), VideoServiceError>;
    async fn disable_video(&self) -> Result<(), VideoServiceError>;
    async fn enable_audio(&self) -> Result<(), VideoServiceError>;
    async fn disable_audio(&self) -> Result<(), VideoServiceError>;
    async fn set_video_quality(&self, quality: VideoQuality) -> Result<(), VideoServiceError>;

    // ---- coach-only controls ---------------------------------------------

    async fn mute_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError>;
    async fn remove_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError>;
    async fn spotlight_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError>;
    async fn clear_spotlight(&self) -> Result<(), VideoServiceError>;

    // ---- scaling controls ------------------------------------------------

    async fn enable_selective_streaming(
        &self,
        config: SelectiveStreamingConfig,
    ) -> Result<(), VideoServiceError>;
    async fn set_participant_video_limit(&self, limit: usize) -> Result<(), VideoServiceError>;
    async fn enable_audio_only_mode(&self) -> Result<(), VideoServiceError>;
    async fn connection_statistics(&self) -> Result<ConnectionStatistics, VideoServiceError>;

    // ---- rendering -------------------------------------------------------

    /// Binds a participant's live video to a UI-owned surface. Repeated
    /// binds are idempotent; a participant who is not publishing yields a
    /// placeholder rather than an error.
    async fn render_participant_video(
        &self,
        id: &ParticipantId,
        surface: RenderSurface,
    ) -> Result<RenderState, VideoServiceError>;

    async fn stop_rendering_video(&self, id: &ParticipantId) -> Result<(), VideoServiceError>;

    // ---- vendor push ingestion -------------------------------------------

    /// Entry point for raw vendor push payloads (webhooks, signaling
    /// sockets). Malformed payloads are dropped with a warning, never
    /// propagated.
    async fn ingest_vendor_event(&self, payload: Value);
}
