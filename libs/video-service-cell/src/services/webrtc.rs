use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use session_cell::{
    ConnectionQuality, MediaState, Participant, ParticipantId, ParticipantRole, SessionId,
};

use crate::error::VideoServiceError;
use crate::events::{
    AudioEvent, ConnectionEvent, EventStreams, ParticipantEvent, ScalingEvent, VideoEvent,
};
use crate::models::{
    ConnectionState, ConnectionStatistics, JoinSessionRequest, JoinSessionResult, RenderState,
    RenderSurface, SelectiveStreamingConfig, ServiceCapabilities, SessionInfo, VideoQuality,
    VideoServiceConfig,
};
use crate::service::VideoService;

const MESH_PARTICIPANT_LIMIT: usize = 16;

struct ActiveRoom {
    session_id: SessionId,
    peer_ref: String,
    local_participant: Participant,
}

#[derive(Default)]
struct MeshState {
    initialized: bool,
    room: Option<ActiveRoom>,
    peers: HashMap<ParticipantId, bool>,
    bindings: HashMap<ParticipantId, RenderSurface>,
    video_limit: Option<usize>,
    audio_only_mode: bool,
}

/// Peer-to-peer mesh adapter. An optional signaling server announces
/// joins and leaves; without one the adapter runs fully local. A mesh
/// has no authority over remote peers, so coach controls and selective
/// streaming refuse rather than silently no-op. Video limits and
/// audio-only mode only affect what the local end decodes, so those are
/// applied locally either way.
pub struct WebRtcVideoService {
    http: Client,
    signaling_url: Option<String>,
    events: Arc<EventStreams>,
    state: RwLock<MeshState>,
    closed: AtomicBool,
}

impl WebRtcVideoService {
    pub fn new(config: VideoServiceConfig) -> Result<Self, VideoServiceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.operation_timeout_secs))
            .build()
            .map_err(|e| VideoServiceError::Initialization(e.to_string()))?;

        Ok(Self {
            http,
            signaling_url: config.server_url.clone(),
            events: Arc::new(EventStreams::new()),
            state: RwLock::new(MeshState::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn static_capabilities() -> ServiceCapabilities {
        ServiceCapabilities {
            provider: "webrtc",
            max_participants: MESH_PARTICIPANT_LIMIT,
            supports_screen_share: true,
            supports_recording: false,
            supports_selective_streaming: false,
            supports_coach_controls: false,
            supported_qualities: vec![VideoQuality::Low, VideoQuality::Medium, VideoQuality::High],
        }
    }

    fn is_destroyed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), VideoServiceError> {
        if self.is_destroyed() {
            return Err(VideoServiceError::Initialization(
                "video service has been destroyed".to_string(),
            ));
        }
        Ok(())
    }

    async fn announce(&self, path: &str, body: Value) -> Result<Option<Value>, VideoServiceError> {
        let Some(base) = &self.signaling_url else {
            return Ok(None);
        };
        let url = format!("{}{}", base, path);
        debug!("Signaling request: POST {}", url);

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(VideoServiceError::Vendor(format!("HTTP {}: {}", status, text)));
        }
        if text.is_empty() {
            Ok(Some(Value::Null))
        } else {
            serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| VideoServiceError::Vendor(format!("unparseable response: {}", e)))
        }
    }

    async fn local_participant(&self) -> Result<Participant, VideoServiceError> {
        let state = self.state.read().await;
        state
            .room
            .as_ref()
            .map(|r| r.local_participant.clone())
            .ok_or(VideoServiceError::NotJoined)
    }

    async fn set_local_media(
        &self,
        video: Option<bool>,
        audio: Option<bool>,
    ) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (session_id, peer_ref) = {
            let state = self.state.read().await;
            let room = state.room.as_ref().ok_or(VideoServiceError::NotJoined)?;
            (room.session_id.clone(), room.peer_ref.clone())
        };

        // Mesh media toggles are local track operations; the signaling
        // server is only informed so other peers can update their UI.
        self.announce(
            &format!("/rooms/{}/peers/{}/media", session_id, peer_ref),
            json!({ "video": video, "audio": audio }),
        )
        .await?;

        if self.is_destroyed() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        if let Some(room) = state.room.as_mut() {
            let local_id = room.local_participant.id().clone();
            if let Some(video) = video {
                let media = if video { MediaState::Enabled } else { MediaState::Disabled };
                room.local_participant = room.local_participant.with_video(media);
                self.events.emit_video(VideoEvent::StateChanged {
                    participant_id: local_id.clone(),
                    enabled: video,
                });
            }
            if let Some(audio) = audio {
                let media = if audio { MediaState::Enabled } else { MediaState::Disabled };
                room.local_participant = room.local_participant.with_audio(media);
                self.events.emit_audio(AudioEvent::StateChanged {
                    participant_id: local_id,
                    enabled: audio,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VideoService for WebRtcVideoService {
    fn capabilities(&self) -> ServiceCapabilities {
        Self::static_capabilities()
    }

    fn events(&self) -> Arc<EventStreams> {
        Arc::clone(&self.events)
    }

    async fn initialize(&self) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        {
            let state = self.state.read().await;
            if state.initialized {
                return Ok(());
            }
        }

        match &self.signaling_url {
            Some(url) => {
                info!("Initializing mesh video service with signaling at {}", url);
                let response = self
                    .http
                    .get(format!("{}/health", url))
                    .send()
                    .await
                    .map_err(|e| VideoServiceError::Initialization(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(VideoServiceError::Initialization(format!(
                        "signaling server returned HTTP {}",
                        response.status()
                    )));
                }
            }
            None => {
                info!("Initializing mesh video service in local mode");
            }
        }

        if self.is_destroyed() {
            return Ok(());
        }
        self.state.write().await.initialized = true;
        self.events
            .emit_connection(ConnectionEvent::StateChanged {
                state: ConnectionState::Connecting,
            });
        Ok(())
    }

    async fn destroy(&self) -> Result<(), VideoServiceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Destroying mesh video service");

        let mut state = self.state.write().await;
        state.room = None;
        state.peers.clear();
        state.bindings.clear();
        state.initialized = false;
        drop(state);

        self.events.close();
        Ok(())
    }

    async fn join_session(
        &self,
        request: JoinSessionRequest,
    ) -> Result<JoinSessionResult, VideoServiceError> {
        self.ensure_open()?;
        {
            let state = self.state.read().await;
            if !state.initialized {
                return Err(VideoServiceError::Initialization(
                    "service not initialized".to_string(),
                ));
            }
        }

        info!(
            "Joining mesh room {} as {:?}",
            request.session_id, request.participant_role
        );

        let response = self
            .announce(
                &format!("/rooms/{}/peers", request.session_id),
                json!({
                    "name": request.participant_name,
                    "role": match request.participant_role {
                        ParticipantRole::Coach => "coach",
                        ParticipantRole::Student => "student",
                    },
                }),
            )
            .await?;

        // Local mode has no server to assign peer ids.
        let peer_ref = response
            .as_ref()
            .and_then(|r| r["peer_id"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let local_id = ParticipantId::new(peer_ref.clone())?;
        let mut participant = Participant::new(
            local_id,
            request.participant_name.clone(),
            request.participant_role,
        );
        if request.video_enabled {
            participant = participant.with_video(MediaState::Enabled);
        }
        if request.audio_enabled {
            participant = participant.with_audio(MediaState::Enabled);
        }

        if self.is_destroyed() {
            return Err(VideoServiceError::Initialization(
                "video service has been destroyed".to_string(),
            ));
        }

        let session_info = SessionInfo {
            session_id: request.session_id.clone(),
            vendor_session_ref: peer_ref.clone(),
            joined_at: chrono::Utc::now(),
        };

        let mut state = self.state.write().await;
        state.room = Some(ActiveRoom {
            session_id: request.session_id,
            peer_ref,
            local_participant: participant.clone(),
        });
        drop(state);

        self.events
            .emit_participant(ParticipantEvent::Joined(participant.clone()));
        self.events
            .emit_connection(ConnectionEvent::StateChanged {
                state: ConnectionState::Connected,
            });

        Ok(JoinSessionResult {
            participant,
            session_info,
        })
    }

    async fn leave_session(&self) -> Result<(), VideoServiceError> {
        let existing = {
            let mut state = self.state.write().await;
            state.peers.clear();
            state.bindings.clear();
            state.room.take()
        };

        let Some(room) = existing else {
            return Ok(());
        };

        info!("Leaving mesh room {}", room.session_id);
        let _ = self
            .announce(
                &format!("/rooms/{}/peers/{}/leave", room.session_id, room.peer_ref),
                json!({}),
            )
            .await;

        self.events
            .emit_participant(ParticipantEvent::Left(room.local_participant.id().clone()));
        Ok(())
    }

    async fn enable_video(&self) -> Result<(), VideoServiceError> {
        self.set_local_media(Some(true), None).await
    }

    async fn disable_video(&self) -> Result<(), VideoServiceError> {
        self.set_local_media(Some(false), None).await
    }

    async fn enable_audio(&self) -> Result<(), VideoServiceError> {
        self.set_local_media(None, Some(true)).await
    }

    async fn disable_audio(&self) -> Result<(), VideoServiceError> {
        self.set_local_media(None, Some(false)).await
    }

    async fn set_video_quality(&self, quality: VideoQuality) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        self.local_participant().await?;
        // Track constraints are renegotiated locally per peer connection.
        debug!("Mesh local capture quality set to {}", quality.as_str());
        Ok(())
    }

    async fn mute_participant(&self, _id: &ParticipantId) -> Result<(), VideoServiceError> {
        Err(VideoServiceError::Unsupported(
            "mesh peers cannot mute each other",
        ))
    }

    async fn remove_participant(&self, _id: &ParticipantId) -> Result<(), VideoServiceError> {
        Err(VideoServiceError::Unsupported(
            "mesh peers cannot remove each other",
        ))
    }

    async fn spotlight_participant(&self, _id: &ParticipantId) -> Result<(), VideoServiceError> {
        Err(VideoServiceError::Unsupported(
            "mesh has no shared spotlight channel",
        ))
    }

    async fn clear_spotlight(&self) -> Result<(), VideoServiceError> {
        Err(VideoServiceError::Unsupported(
            "mesh has no shared spotlight channel",
        ))
    }

    async fn enable_selective_streaming(
        &self,
        _config: SelectiveStreamingConfig,
    ) -> Result<(), VideoServiceError> {
        Err(VideoServiceError::Unsupported(
            "mesh topology streams every peer to every peer",
        ))
    }

    async fn set_participant_video_limit(&self, limit: usize) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        self.local_participant().await?;
        self.state.write().await.video_limit = Some(limit);
        debug!("Mesh decode limit set to {} remote streams", limit);
        Ok(())
    }

    async fn enable_audio_only_mode(&self) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        self.local_participant().await?;
        self.state.write().await.audio_only_mode = true;
        Ok(())
    }

    async fn connection_statistics(&self) -> Result<ConnectionStatistics, VideoServiceError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        if state.room.is_none() {
            return Err(VideoServiceError::NotJoined);
        }

        let video_streams = state.peers.values().filter(|on| **on).count()
            + state
                .room
                .as_ref()
                .map(|r| usize::from(r.local_participant.video_state().is_enabled()))
                .unwrap_or(0);

        Ok(ConnectionStatistics {
            participant_count: state.peers.len() + 1,
            video_streams,
            audio_only_participants: if state.audio_only_mode { state.peers.len() } else { 0 },
            bandwidth_kbps: 0,
            latency_ms: 0,
            cpu_percent: 0.0,
            memory_mb: 0,
        })
    }

    async fn render_participant_video(
        &self,
        id: &ParticipantId,
        surface: RenderSurface,
    ) -> Result<RenderState, VideoServiceError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.bindings.insert(id.clone(), surface);

        let publishing = state.peers.get(id).copied().unwrap_or(false)
            || state
                .room
                .as_ref()
                .map(|r| {
                    r.local_participant.id() == id
                        && r.local_participant.video_state().is_enabled()
                })
                .unwrap_or(false);

        Ok(if publishing {
            RenderState::Live
        } else {
            RenderState::Placeholder
        })
    }

    async fn stop_rendering_video(&self, id: &ParticipantId) -> Result<(), VideoServiceError> {
        let mut state = self.state.write().await;
        state.bindings.remove(id);
        Ok(())
    }

    async fn ingest_vendor_event(&self, payload: Value) {
        if self.is_destroyed() {
            return;
        }

        let Some(kind) = payload["type"].as_str() else {
            warn!("Dropping signaling message without a type");
            return;
        };

        let peer_id = |payload: &Value| -> Option<ParticipantId> {
            payload["peer_id"]
                .as_str()
                .and_then(|raw| ParticipantId::new(raw).ok())
        };

        match kind {
            "peer_joined" => {
                let Some(id) = peer_id(&payload) else {
                    warn!("Dropping peer_joined without a usable peer_id");
                    return;
                };
                let name = payload["name"].as_str().unwrap_or("peer");
                let role = if payload["role"].as_str() == Some("coach") {
                    ParticipantRole::Coach
                } else {
                    ParticipantRole::Student
                };

                let limit_hit = {
                    let mut state = self.state.write().await;
                    state.peers.insert(id.clone(), false);
                    state.peers.len() + 1 >= MESH_PARTICIPANT_LIMIT
                };
                self.events
                    .emit_participant(ParticipantEvent::Joined(Participant::new(id, name, role)));
                if limit_hit {
                    self.events
                        .emit_scaling(ScalingEvent::ParticipantLimitReached {
                            limit: MESH_PARTICIPANT_LIMIT,
                        });
                }
            }
            "peer_left" => {
                let Some(id) = peer_id(&payload) else {
                    warn!("Dropping peer_left without a usable peer_id");
                    return;
                };
                let mut state = self.state.write().await;
                state.peers.remove(&id);
                state.bindings.remove(&id);
                drop(state);
                self.events.emit_participant(ParticipantEvent::Left(id));
            }
            "track_updated" => {
                let Some(id) = peer_id(&payload) else {
                    warn!("Dropping track_updated without a usable peer_id");
                    return;
                };
                let enabled = payload["enabled"].as_bool().unwrap_or(false);
                match payload["kind"].as_str() {
                    Some("video") => {
                        self.state.write().await.peers.insert(id.clone(), enabled);
                        self.events.emit_video(VideoEvent::StateChanged {
                            participant_id: id,
                            enabled,
                        });
                    }
                    Some("audio") => {
                        self.events.emit_audio(AudioEvent::StateChanged {
                            participant_id: id,
                            enabled,
                        });
                    }
                    other => {
                        warn!("Dropping track_updated with unknown kind {:?}", other);
                    }
                }
            }
            "speaking" => {
                let Some(id) = peer_id(&payload) else {
                    warn!("Dropping speaking message without a usable peer_id");
                    return;
                };
                self.events.emit_audio(AudioEvent::ActiveSpeaker {
                    participant_id: id,
                    speaking: payload["speaking"].as_bool().unwrap_or(true),
                });
            }
            "quality" => {
                let Some(id) = peer_id(&payload) else {
                    warn!("Dropping quality message without a usable peer_id");
                    return;
                };
                let score = payload["score"].as_f64().unwrap_or(0.0);
                self.events.emit_connection(ConnectionEvent::QualityChanged {
                    participant_id: id,
                    quality: ConnectionQuality::from_score(score),
                });
            }
            "connection" => {
                let Some(state) = payload["state"].as_str().and_then(ConnectionState::parse)
                else {
                    warn!("Dropping connection message with unknown state");
                    return;
                };
                self.events
                    .emit_connection(ConnectionEvent::StateChanged { state });
            }
            "degraded" => {
                let reason = payload["reason"]
                    .as_str()
                    .unwrap_or("unspecified")
                    .to_string();
                self.events
                    .emit_scaling(ScalingEvent::DegradedPerformance { reason });
            }
            other => {
                warn!("Dropping unrecognized signaling message type {}", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn local_config() -> VideoServiceConfig {
        VideoServiceConfig {
            app_id: String::new(),
            app_secret: None,
            server_url: None,
            max_participants: 100,
            enable_logging: false,
            region: None,
            allow_unauthenticated_join: true,
            operation_timeout_secs: 5,
        }
    }

    fn joined_service() -> WebRtcVideoService {
        WebRtcVideoService::new(local_config()).unwrap()
    }

    async fn join(service: &WebRtcVideoService) -> Participant {
        service.initialize().await.unwrap();
        let result = service
            .join_session(JoinSessionRequest::new(
                SessionId::new("room-1").unwrap(),
                "Jo",
                ParticipantRole::Student,
            ))
            .await
            .unwrap();
        result.participant
    }

    #[tokio::test]
    async fn local_mode_joins_without_signaling_server() {
        let service = joined_service();
        let participant = join(&service).await;
        assert_eq!(participant.name(), "Jo");
    }

    #[tokio::test]
    async fn coach_controls_are_refused() {
        let service = joined_service();
        join(&service).await;
        let other = ParticipantId::new("peer-2").unwrap();

        assert_matches!(
            service.mute_participant(&other).await,
            Err(VideoServiceError::Unsupported(_))
        );
        assert_matches!(
            service.remove_participant(&other).await,
            Err(VideoServiceError::Unsupported(_))
        );
        assert_matches!(
            service.spotlight_participant(&other).await,
            Err(VideoServiceError::Unsupported(_))
        );
        assert_matches!(
            service.clear_spotlight().await,
            Err(VideoServiceError::Unsupported(_))
        );
    }

    #[tokio::test]
    async fn selective_streaming_is_refused() {
        let service = joined_service();
        join(&service).await;

        let result = service
            .enable_selective_streaming(SelectiveStreamingConfig::default())
            .await;
        assert_matches!(result, Err(VideoServiceError::Unsupported(_)));
    }

    #[tokio::test]
    async fn video_limit_is_applied_locally() {
        let service = joined_service();
        join(&service).await;
        service.set_participant_video_limit(4).await.unwrap();
        assert_eq!(service.state.read().await.video_limit, Some(4));
    }

    #[tokio::test]
    async fn peer_join_near_capacity_raises_scaling_event() {
        let service = joined_service();
        join(&service).await;
        let mut scaling = service.events().subscribe_scaling();

        for n in 0..(MESH_PARTICIPANT_LIMIT - 1) {
            service
                .ingest_vendor_event(json!({
                    "type": "peer_joined",
                    "peer_id": format!("peer-{}", n),
                    "name": "P",
                }))
                .await;
        }

        let stamped = scaling.try_recv().unwrap();
        assert_matches!(
            stamped.event,
            ScalingEvent::ParticipantLimitReached { limit: MESH_PARTICIPANT_LIMIT }
        );
    }

    #[tokio::test]
    async fn render_binding_reports_placeholder_until_track_arrives() {
        let service = joined_service();
        join(&service).await;

        service
            .ingest_vendor_event(json!({
                "type": "peer_joined", "peer_id": "peer-9", "name": "Sam"
            }))
            .await;

        let id = ParticipantId::new("peer-9").unwrap();
        let state = service
            .render_participant_video(&id, RenderSurface::new("tile-9"))
            .await
            .unwrap();
        assert_eq!(state, RenderState::Placeholder);

        service
            .ingest_vendor_event(json!({
                "type": "track_updated", "peer_id": "peer-9",
                "kind": "video", "enabled": true
            }))
            .await;

        let state = service
            .render_participant_video(&id, RenderSurface::new("tile-9"))
            .await
            .unwrap();
        assert_eq!(state, RenderState::Live);
    }
}
