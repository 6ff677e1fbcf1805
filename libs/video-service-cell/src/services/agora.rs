use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

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
use crate::token::JoinTokenSigner;

const DEFAULT_BASE_URL: &str = "https://api.agora.io/v1";

// Vendor notification event codes.
const EVT_USER_JOINED: u64 = 103;
const EVT_USER_LEFT: u64 = 104;
const EVT_VIDEO_STATE: u64 = 110;
const EVT_AUDIO_STATE: u64 = 111;
const EVT_ACTIVE_SPEAKER: u64 = 112;
const EVT_NETWORK_QUALITY: u64 = 113;
const EVT_CONNECTION_STATE: u64 = 114;
const EVT_CAPACITY_NOTICE: u64 = 120;

struct ActiveChannel {
    session_id: SessionId,
    channel_ref: String,
    local_uid: u64,
    local_participant: Participant,
}

#[derive(Default)]
struct AgoraState {
    initialized: bool,
    channel: Option<ActiveChannel>,
    bindings: HashMap<ParticipantId, RenderSurface>,
    remote_video_on: HashSet<ParticipantId>,
    subscribed_video_limit: Option<usize>,
    audio_only_mode: bool,
}

/// Adapter for an Agora-style RTC service. The vendor assigns numeric
/// UIDs; they are normalized into `ParticipantId` before anything leaves
/// this type. Channel notifications arrive as numeric event codes.
pub struct AgoraVideoService {
    http: Client,
    base_url: String,
    config: VideoServiceConfig,
    signer: Arc<dyn JoinTokenSigner>,
    events: Arc<EventStreams>,
    state: RwLock<AgoraState>,
    closed: AtomicBool,
}

impl AgoraVideoService {
    pub fn new(
        config: VideoServiceConfig,
        signer: Arc<dyn JoinTokenSigner>,
    ) -> Result<Self, VideoServiceError> {
        if config.app_id.is_empty() {
            return Err(VideoServiceError::Validation(
                "agora provider requires an application id".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.operation_timeout_secs))
            .build()
            .map_err(|e| VideoServiceError::Initialization(e.to_string()))?;

        let base_url = config
            .server_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            http,
            base_url,
            config,
            signer,
            events: Arc::new(EventStreams::new()),
            state: RwLock::new(AgoraState::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn static_capabilities() -> ServiceCapabilities {
        ServiceCapabilities {
            provider: "agora",
            max_participants: 128,
            supports_screen_share: true,
            supports_recording: false,
            supports_selective_streaming: true,
            supports_coach_controls: true,
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

    fn channel_url(&self, channel_ref: &str, tail: &str) -> String {
        let mut url = format!(
            "{}/apps/{}/channels/{}{}",
            self.base_url, self.config.app_id, channel_ref, tail
        );
        if let Some(region) = &self.config.region {
            url.push_str(&format!("?region={}", region));
        }
        url
    }

    async fn post(&self, url: &str, body: Value) -> Result<Value, VideoServiceError> {
        debug!("Agora request: POST {}", url);
        let response = self.http.post(url).json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("Agora request failed: {} - {}", status, text);
            return Err(VideoServiceError::Vendor(format!("HTTP {}: {}", status, text)));
        }

        if text.is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(&text)
                .map_err(|e| VideoServiceError::Vendor(format!("unparseable response: {}", e)))
        }
    }

    async fn channel_ref(&self) -> Result<(String, u64), VideoServiceError> {
        let state = self.state.read().await;
        let channel = state.channel.as_ref().ok_or(VideoServiceError::NotJoined)?;
        Ok((channel.channel_ref.clone(), channel.local_uid))
    }

    async fn set_local_media(
        &self,
        video: Option<bool>,
        audio: Option<bool>,
    ) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, uid) = self.channel_ref().await?;

        let body = json!({
            "uid": uid,
            "video": video,
            "audio": audio,
        });
        self.post(&self.channel_url(&channel_ref, "/media"), body)
            .await
            .map_err(|e| match e {
                VideoServiceError::Vendor(message) => VideoServiceError::MediaAccess(message),
                other => other,
            })?;

        if self.is_destroyed() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        if let Some(channel) = state.channel.as_mut() {
            let local_id = channel.local_participant.id().clone();
            if let Some(video) = video {
                let media = if video { MediaState::Enabled } else { MediaState::Disabled };
                channel.local_participant = channel.local_participant.with_video(media);
                self.events.emit_video(VideoEvent::StateChanged {
                    participant_id: local_id.clone(),
                    enabled: video,
                });
            }
            if let Some(audio) = audio {
                let media = if audio { MediaState::Enabled } else { MediaState::Disabled };
                channel.local_participant = channel.local_participant.with_audio(media);
                self.events.emit_audio(AudioEvent::StateChanged {
                    participant_id: local_id,
                    enabled: audio,
                });
            }
        }
        Ok(())
    }

    fn uid_from(value: &Value) -> Option<ParticipantId> {
        value.as_u64().map(ParticipantId::from_numeric)
    }
}

#[async_trait]
impl VideoService for AgoraVideoService {
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

        info!("Initializing Agora video service (app {})", self.config.app_id);
        let url = format!("{}/apps/{}/status", self.base_url, self.config.app_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| VideoServiceError::Initialization(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VideoServiceError::Initialization(format!(
                "vendor endpoint returned HTTP {}",
                response.status()
            )));
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
        info!("Destroying Agora video service");

        let mut state = self.state.write().await;
        state.channel = None;
        state.bindings.clear();
        state.remote_video_on.clear();
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

        let token = self.signer.sign(
            &request.session_id,
            &request.participant_name,
            request.participant_role,
        )?;

        info!(
            "Joining Agora channel {} as {:?}",
            request.session_id, request.participant_role
        );

        let body = json!({
            "account": request.participant_name,
            "role": match request.participant_role {
                ParticipantRole::Coach => 1,
                ParticipantRole::Student => 2,
            },
            "token": token,
        });
        let response = self
            .post(
                &self.channel_url(request.session_id.as_str(), "/users"),
                body,
            )
            .await?;

        let uid = response["uid"].as_u64().ok_or_else(|| {
            VideoServiceError::Vendor("join response missing uid".to_string())
        })?;
        let channel_ref = response["channel"]
            .as_str()
            .unwrap_or(request.session_id.as_str())
            .to_string();

        let local_id = ParticipantId::from_numeric(uid);
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
            vendor_session_ref: channel_ref.clone(),
            joined_at: chrono::Utc::now(),
        };

        let mut state = self.state.write().await;
        state.channel = Some(ActiveChannel {
            session_id: request.session_id,
            channel_ref,
            local_uid: uid,
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
            state.bindings.clear();
            state.remote_video_on.clear();
            state.channel.take()
        };

        let Some(channel) = existing else {
            return Ok(());
        };

        info!("Leaving Agora channel {}", channel.session_id);
        let _ = self
            .post(
                &self.channel_url(&channel.channel_ref, &format!("/users/{}/leave", channel.local_uid)),
                json!({}),
            )
            .await;

        self.events.emit_participant(ParticipantEvent::Left(
            channel.local_participant.id().clone(),
        ));
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
        let (channel_ref, uid) = self.channel_ref().await?;
        self.post(
            &self.channel_url(&channel_ref, &format!("/users/{}/profile", uid)),
            json!({ "profile": quality.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn mute_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, _) = self.channel_ref().await?;
        self.post(
            &self.channel_url(&channel_ref, &format!("/users/{}/mute", id)),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn remove_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, _) = self.channel_ref().await?;
        self.post(
            &self.channel_url(&channel_ref, &format!("/users/{}/kick", id)),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn spotlight_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, _) = self.channel_ref().await?;
        self.post(
            &self.channel_url(&channel_ref, "/spotlight"),
            json!({ "uid": id.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn clear_spotlight(&self) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, _) = self.channel_ref().await?;
        self.post(&self.channel_url(&channel_ref, "/spotlight/clear"), json!({}))
            .await?;
        Ok(())
    }

    async fn enable_selective_streaming(
        &self,
        config: SelectiveStreamingConfig,
    ) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        config.validate()?;
        let (channel_ref, uid) = self.channel_ref().await?;

        let to_ids = |set: &HashSet<ParticipantId>| -> Vec<String> {
            set.iter().map(|id| id.to_string()).collect()
        };
        self.post(
            &self.channel_url(&channel_ref, &format!("/users/{}/subscriptions", uid)),
            json!({
                "high": to_ids(&config.active_streams),
                "low": to_ids(&config.thumbnail_streams),
                "audio_only": to_ids(&config.audio_only_streams),
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_participant_video_limit(&self, limit: usize) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, uid) = self.channel_ref().await?;
        self.post(
            &self.channel_url(&channel_ref, &format!("/users/{}/stream-limit", uid)),
            json!({ "limit": limit }),
        )
        .await?;

        if !self.is_destroyed() {
            self.state.write().await.subscribed_video_limit = Some(limit);
        }
        Ok(())
    }

    async fn enable_audio_only_mode(&self) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, uid) = self.channel_ref().await?;
        self.post(
            &self.channel_url(&channel_ref, &format!("/users/{}/audio-only", uid)),
            json!({ "enabled": true }),
        )
        .await?;

        if !self.is_destroyed() {
            self.state.write().await.audio_only_mode = true;
        }
        Ok(())
    }

    async fn connection_statistics(&self) -> Result<ConnectionStatistics, VideoServiceError> {
        self.ensure_open()?;
        let (channel_ref, _) = self.channel_ref().await?;

        let url = self.channel_url(&channel_ref, "/metrics");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(VideoServiceError::Vendor(format!(
                "metrics returned HTTP {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);

        Ok(ConnectionStatistics {
            participant_count: body["audience_count"].as_u64().unwrap_or(0) as usize,
            video_streams: body["publishers"].as_u64().unwrap_or(0) as usize,
            audio_only_participants: body["audio_only"].as_u64().unwrap_or(0) as usize,
            bandwidth_kbps: body["tx_kbps"].as_u64().unwrap_or(0)
                + body["rx_kbps"].as_u64().unwrap_or(0),
            latency_ms: body["rtt_ms"].as_u64().unwrap_or(0),
            // The vendor does not expose host metrics; report zero.
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

        let publishing = state.remote_video_on.contains(id)
            || state
                .channel
                .as_ref()
                .map(|c| {
                    c.local_participant.id() == id
                        && c.local_participant.video_state().is_enabled()
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

        let Some(event_type) = payload["eventType"].as_u64() else {
            warn!("Dropping Agora notification without eventType");
            return;
        };
        let body = &payload["payload"];

        match event_type {
            EVT_USER_JOINED => {
                let Some(id) = Self::uid_from(&body["uid"]) else {
                    warn!("Dropping Agora join notification without a usable uid");
                    return;
                };
                let name = body["account"].as_str().unwrap_or("unknown");
                let role = if body["role"].as_u64() == Some(1) {
                    ParticipantRole::Coach
                } else {
                    ParticipantRole::Student
                };
                self.events
                    .emit_participant(ParticipantEvent::Joined(Participant::new(id, name, role)));
            }
            EVT_USER_LEFT => {
                let Some(id) = Self::uid_from(&body["uid"]) else {
                    warn!("Dropping Agora leave notification without a usable uid");
                    return;
                };
                let mut state = self.state.write().await;
                state.remote_video_on.remove(&id);
                state.bindings.remove(&id);
                drop(state);
                self.events.emit_participant(ParticipantEvent::Left(id));
            }
            EVT_VIDEO_STATE => {
                let Some(id) = Self::uid_from(&body["uid"]) else {
                    warn!("Dropping Agora video notification without a usable uid");
                    return;
                };
                let enabled = body["muted"].as_bool().map(|m| !m).unwrap_or(false);
                let mut state = self.state.write().await;
                if enabled {
                    state.remote_video_on.insert(id.clone());
                } else {
                    state.remote_video_on.remove(&id);
                }
                drop(state);
                self.events.emit_video(VideoEvent::StateChanged {
                    participant_id: id,
                    enabled,
                });
            }
            EVT_AUDIO_STATE => {
                let Some(id) = Self::uid_from(&body["uid"]) else {
                    warn!("Dropping Agora audio notification without a usable uid");
                    return;
                };
                let enabled = body["muted"].as_bool().map(|m| !m).unwrap_or(false);
                self.events.emit_audio(AudioEvent::StateChanged {
                    participant_id: id,
                    enabled,
                });
            }
            EVT_ACTIVE_SPEAKER => {
                let Some(id) = Self::uid_from(&body["uid"]) else {
                    warn!("Dropping Agora speaker notification without a usable uid");
                    return;
                };
                self.events.emit_audio(AudioEvent::ActiveSpeaker {
                    participant_id: id,
                    speaking: body["speaking"].as_bool().unwrap_or(true),
                });
            }
            EVT_NETWORK_QUALITY => {
                let Some(id) = Self::uid_from(&body["uid"]) else {
                    warn!("Dropping Agora quality notification without a usable uid");
                    return;
                };
                let score = body["score"].as_f64().unwrap_or(0.0);
                self.events.emit_connection(ConnectionEvent::QualityChanged {
                    participant_id: id,
                    quality: ConnectionQuality::from_score(score),
                });
            }
            EVT_CONNECTION_STATE => {
                let Some(state) = body["state"].as_str().and_then(ConnectionState::parse) else {
                    warn!("Dropping Agora connection notification with unknown state");
                    return;
                };
                self.events
                    .emit_connection(ConnectionEvent::StateChanged { state });
            }
            EVT_CAPACITY_NOTICE => {
                if let Some(limit) = body["limit"].as_u64() {
                    self.events
                        .emit_scaling(ScalingEvent::ParticipantLimitReached {
                            limit: limit as usize,
                        });
                } else {
                    let reason = body["reason"].as_str().unwrap_or("unspecified").to_string();
                    self.events
                        .emit_scaling(ScalingEvent::DegradedPerformance { reason });
                }
            }
            other => {
                warn!("Dropping unrecognized Agora eventType {}", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::UnauthenticatedTokens;

    fn test_config() -> VideoServiceConfig {
        VideoServiceConfig {
            app_id: "agora-app".to_string(),
            app_secret: None,
            server_url: Some("http://localhost:8081".to_string()),
            max_participants: 100,
            enable_logging: false,
            region: Some("eu".to_string()),
            allow_unauthenticated_join: true,
            operation_timeout_secs: 5,
        }
    }

    fn service() -> AgoraVideoService {
        AgoraVideoService::new(test_config(), Arc::new(UnauthenticatedTokens)).unwrap()
    }

    #[test]
    fn region_hint_is_appended_to_urls() {
        let service = service();
        let url = service.channel_url("class-1", "/users");
        assert!(url.ends_with("?region=eu"));
    }

    #[test]
    fn capabilities_exclude_recording() {
        let caps = AgoraVideoService::static_capabilities();
        assert!(!caps.supports_recording);
        assert_eq!(caps.max_participants, 128);
    }

    #[tokio::test]
    async fn join_notification_with_string_uid_is_dropped() {
        let service = service();
        let mut rx = service.events().subscribe_participant();

        service
            .ingest_vendor_event(serde_json::json!({
                "eventType": EVT_USER_JOINED,
                "payload": { "uid": "not-numeric", "account": "Kim" }
            }))
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn muted_flag_is_inverted_into_enabled() {
        let service = service();
        let mut rx = service.events().subscribe_video();

        service
            .ingest_vendor_event(serde_json::json!({
                "eventType": EVT_VIDEO_STATE,
                "payload": { "uid": 9, "muted": false }
            }))
            .await;

        let stamped = rx.try_recv().unwrap();
        let VideoEvent::StateChanged { participant_id, enabled } = stamped.event;
        assert_eq!(participant_id.as_str(), "9");
        assert!(enabled);
    }

    #[tokio::test]
    async fn unknown_event_type_is_dropped() {
        let service = service();
        let mut participant = service.events().subscribe_participant();
        let mut scaling = service.events().subscribe_scaling();

        service
            .ingest_vendor_event(serde_json::json!({ "eventType": 999, "payload": {} }))
            .await;

        assert!(participant.try_recv().is_err());
        assert!(scaling.try_recv().is_err());
    }
}
