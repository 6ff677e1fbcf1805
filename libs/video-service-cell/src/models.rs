use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use session_cell::{Participant, ParticipantId, ParticipantRole, SessionId, StreamPlan};
use shared_config::AppConfig;

use crate::error::VideoServiceError;

/// Static configuration an adapter is constructed with. Resolved once from
/// `AppConfig`; adapters never probe the environment themselves.
#[derive(Debug, Clone)]
pub struct VideoServiceConfig {
    pub app_id: String,
    pub app_secret: Option<String>,
    pub server_url: Option<String>,
    pub max_participants: usize,
    pub enable_logging: bool,
    pub region: Option<String>,
    pub allow_unauthenticated_join: bool,
    pub operation_timeout_secs: u64,
}

impl From<&AppConfig> for VideoServiceConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            app_id: config.video_app_id.clone(),
            app_secret: config.video_app_secret.clone(),
            server_url: config.video_server_url.clone(),
            max_participants: config.max_participants,
            enable_logging: config.enable_logging,
            region: config.region.clone(),
            allow_unauthenticated_join: config.allow_unauthenticated_join,
            operation_timeout_secs: config.operation_timeout_secs,
        }
    }
}

/// Static description of what an adapter can do, so feature gating never
/// needs vendor-specific conditionals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCapabilities {
    pub provider: &'static str,
    pub max_participants: usize,
    pub supports_screen_share: bool,
    pub supports_recording: bool,
    pub supports_selective_streaming: bool,
    pub supports_coach_controls: bool,
    pub supported_qualities: Vec<VideoQuality>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoQuality {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
}

impl VideoQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoQuality::Low => "low",
            VideoQuality::Medium => "medium",
            VideoQuality::High => "high",
        }
    }
}

/// Vendor connection states, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[serde(rename = "connecting")]
    Connecting,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    Disconnected,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "closed")]
    Closed,
}

impl ConnectionState {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "connecting" => Some(ConnectionState::Connecting),
            "connected" => Some(ConnectionState::Connected),
            "disconnected" => Some(ConnectionState::Disconnected),
            "failed" => Some(ConnectionState::Failed),
            "closed" => Some(ConnectionState::Closed),
            _ => None,
        }
    }

    pub fn is_troubled(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct JoinSessionRequest {
    pub session_id: SessionId,
    pub participant_name: String,
    pub participant_role: ParticipantRole,
    pub video_enabled: bool,
    pub audio_enabled: bool,
}

impl JoinSessionRequest {
    pub fn new(
        session_id: SessionId,
        participant_name: impl Into<String>,
        participant_role: ParticipantRole,
    ) -> Self {
        Self {
            session_id,
            participant_name: participant_name.into(),
            participant_role,
            video_enabled: false,
            audio_enabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinSessionResult {
    pub participant: Participant,
    pub session_info: SessionInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    /// The vendor's own session handle, kept only for adapter bookkeeping.
    pub vendor_session_ref: String,
    pub joined_at: DateTime<Utc>,
}

/// Three disjoint participant sets driving per-set subscription quality.
#[derive(Debug, Clone, Default)]
pub struct SelectiveStreamingConfig {
    pub active_streams: HashSet<ParticipantId>,
    pub thumbnail_streams: HashSet<ParticipantId>,
    pub audio_only_streams: HashSet<ParticipantId>,
}

impl SelectiveStreamingConfig {
    pub fn validate(&self) -> Result<(), VideoServiceError> {
        let overlap = self
            .active_streams
            .iter()
            .any(|id| self.thumbnail_streams.contains(id) || self.audio_only_streams.contains(id))
            || self
                .thumbnail_streams
                .iter()
                .any(|id| self.audio_only_streams.contains(id));
        if overlap {
            return Err(VideoServiceError::Validation(
                "selective streaming sets must be disjoint".to_string(),
            ));
        }
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.active_streams.len() + self.thumbnail_streams.len() + self.audio_only_streams.len()
    }
}

impl From<StreamPlan> for SelectiveStreamingConfig {
    fn from(plan: StreamPlan) -> Self {
        Self {
            active_streams: plan.active.into_iter().collect(),
            thumbnail_streams: plan.thumbnail.into_iter().collect(),
            audio_only_streams: plan.audio_only.into_iter().collect(),
        }
    }
}

/// Aggregate counters pulled from the vendor. Metrics a vendor cannot
/// provide are reported as zero, never fabricated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatistics {
    pub participant_count: usize,
    pub video_streams: usize,
    pub audio_only_participants: usize,
    pub bandwidth_kbps: u64,
    pub latency_ms: u64,
    pub cpu_percent: f32,
    pub memory_mb: u64,
}

/// Handle to a UI-owned drawable surface a participant's video is bound
/// to. The adapter never owns the surface, only the binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderSurface(pub String);

impl RenderSurface {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Result of binding a surface: live video, or a placeholder when the
/// participant is not currently publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderState {
    Live,
    Placeholder,
}
