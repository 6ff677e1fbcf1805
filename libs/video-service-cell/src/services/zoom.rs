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

const DEFAULT_BASE_URL: &str = "https://api.zoom.us/v2";

struct ActiveSession {
    session_id: SessionId,
    vendor_ref: String,
    local_participant: Participant,
}

struct ZoomState {
    initialized: bool,
    session: Option<ActiveSession>,
    video_quality: VideoQuality,
    bindings: HashMap<ParticipantId, RenderSurface>,
    remote_video_on: HashSet<ParticipantId>,
    video_limit: Option<usize>,
    audio_only_mode: bool,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            initialized: false,
            session: None,
            video_quality: VideoQuality::Medium,
            bindings: HashMap::new(),
            remote_video_on: HashSet::new(),
            video_limit: None,
            audio_only_mode: false,
        }
    }
}

/// Adapter for a Zoom-style Video SDK exposed over REST. Vendor payloads
/// are translated into the canonical event shapes at `ingest_vendor_event`
/// and never leak past this type.
pub struct ZoomVideoService {
    http: Client,
    base_url: String,
    config: VideoServiceConfig,
    signer: Arc<dyn JoinTokenSigner>,
    events: Arc<EventStreams>,
    state: RwLock<ZoomState>,
    closed: AtomicBool,
}

impl ZoomVideoService {
    pub fn new(
        config: VideoServiceConfig,
        signer: Arc<dyn JoinTokenSigner>,
    ) -> Result<Self, VideoServiceError> {
        if config.app_id.is_empty() {
            return Err(VideoServiceError::Validation(
                "zoom provider requires an application id".to_string(),
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
            state: RwLock::new(ZoomState::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn static_capabilities() -> ServiceCapabilities {
        ServiceCapabilities {
            provider: "zoom",
            max_participants: 1000,
            supports_screen_share: true,
            supports_recording: true,
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

    async fn post(&self, path: &str, body: Value) -> Result<Value, VideoServiceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Zoom request: POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.app_id))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("Zoom request failed: {} - {}", status, text);
            return Err(VideoServiceError::Vendor(format!("HTTP {}: {}", status, text)));
        }

        if text.is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(&text)
                .map_err(|e| VideoServiceError::Vendor(format!("unparseable response: {}", e)))
        }
    }

    async fn session_ref(&self) -> Result<(String, ParticipantId), VideoServiceError> {
        let state = self.state.read().await;
        let session = state.session.as_ref().ok_or(VideoServiceError::NotJoined)?;
        Ok((
            session.vendor_ref.clone(),
            session.local_participant.id().clone(),
        ))
    }

    /// Pushes a local media change to the vendor and commits state only on
    /// success, so a failed call leaves no orphaned open tracks.
    async fn set_local_media(
        &self,
        video: Option<bool>,
        audio: Option<bool>,
    ) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, local_id) = self.session_ref().await?;

        let mut body = json!({});
        if let Some(video) = video {
            body["video"] = json!(video);
        }
        if let Some(audio) = audio {
            body["audio"] = json!(audio);
        }

        self.post(
            &format!("/videosdk/sessions/{}/users/{}/media", vendor_ref, local_id),
            body,
        )
        .await
        .map_err(|e| match e {
            VideoServiceError::Vendor(message) => VideoServiceError::MediaAccess(message),
            other => other,
        })?;

        if self.is_destroyed() {
            // Torn down while the request was in flight; discard.
            return Ok(());
        }

        let mut state = self.state.write().await;
        if let Some(session) = state.session.as_mut() {
            if let Some(video) = video {
                let media = if video { MediaState::Enabled } else { MediaState::Disabled };
                session.local_participant = session.local_participant.with_video(media);
                self.events.emit_video(VideoEvent::StateChanged {
                    participant_id: local_id.clone(),
                    enabled: video,
                });
            }
            if let Some(audio) = audio {
                let media = if audio { MediaState::Enabled } else { MediaState::Disabled };
                session.local_participant = session.local_participant.with_audio(media);
                self.events.emit_audio(AudioEvent::StateChanged {
                    participant_id: local_id,
                    enabled: audio,
                });
            }
        }
        Ok(())
    }

    fn participant_id_from(value: &Value) -> Option<ParticipantId> {
        match value {
            Value::Number(n) => n.as_u64().map(ParticipantId::from_numeric),
            Value::String(s) => ParticipantId::new(s.clone()).ok(),
            _ => None,
        }
    }

    fn role_from(value: &Value) -> ParticipantRole {
        match value.as_str() {
            Some("coach") | Some("host") => ParticipantRole::Coach,
            _ => ParticipantRole::Student,
        }
    }
}

#[async_trait]
impl VideoService for ZoomVideoService {
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

        info!("Initializing Zoom video service (app {})", self.config.app_id);
        let url = format!("{}/videosdk/apps/{}", self.base_url, self.config.app_id);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.app_id))
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
        info!("Destroying Zoom video service");

        let mut state = self.state.write().await;
        state.session = None;
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
            "Joining Zoom session {} as {:?}",
            request.session_id, request.participant_role
        );

        let mut body = json!({
            "session_name": request.session_id.as_str(),
            "user_name": request.participant_name,
            "role_type": match request.participant_role {
                ParticipantRole::Coach => 1,
                ParticipantRole::Student => 0,
            },
        });
        if let Some(token) = token {
            body["token"] = json!(token);
        }

        let response = self.post("/videosdk/sessions", body).await?;

        let vendor_ref = response["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                VideoServiceError::Vendor("join response missing session id".to_string())
            })?;
        let local_id = Self::participant_id_from(&response["user_id"]).ok_or_else(|| {
            VideoServiceError::Vendor("join response missing user id".to_string())
        })?;

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
            vendor_session_ref: vendor_ref.clone(),
            joined_at: chrono::Utc::now(),
        };

        let mut state = self.state.write().await;
        state.session = Some(ActiveSession {
            session_id: request.session_id,
            vendor_ref,
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
            state.session.take()
        };

        // Already-left state is not an error.
        let Some(session) = existing else {
            return Ok(());
        };

        info!("Leaving Zoom session {}", session.session_id);
        let _ = self
            .post(
                &format!("/videosdk/sessions/{}/leave", session.vendor_ref),
                json!({ "user_id": session.local_participant.id().as_str() }),
            )
            .await;

        self.events.emit_participant(ParticipantEvent::Left(
            session.local_participant.id().clone(),
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
        let (vendor_ref, local_id) = self.session_ref().await?;

        self.post(
            &format!("/videosdk/sessions/{}/users/{}/quality", vendor_ref, local_id),
            json!({ "quality": quality.as_str() }),
        )
        .await?;

        if !self.is_destroyed() {
            self.state.write().await.video_quality = quality;
        }
        Ok(())
    }

    async fn mute_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, _) = self.session_ref().await?;
        self.post(
            &format!("/videosdk/sessions/{}/users/{}/mute", vendor_ref, id),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn remove_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, _) = self.session_ref().await?;
        self.post(
            &format!("/videosdk/sessions/{}/users/{}/remove", vendor_ref, id),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn spotlight_participant(&self, id: &ParticipantId) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, _) = self.session_ref().await?;
        self.post(
            &format!("/videosdk/sessions/{}/spotlight", vendor_ref),
            json!({ "user_id": id.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn clear_spotlight(&self) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, _) = self.session_ref().await?;
        self.post(
            &format!("/videosdk/sessions/{}/spotlight/clear", vendor_ref),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn enable_selective_streaming(
        &self,
        config: SelectiveStreamingConfig,
    ) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        config.validate()?;
        let (vendor_ref, _) = self.session_ref().await?;

        let to_ids = |set: &HashSet<ParticipantId>| -> Vec<String> {
            set.iter().map(|id| id.to_string()).collect()
        };
        self.post(
            &format!("/videosdk/sessions/{}/subscriptions", vendor_ref),
            json!({
                "active": to_ids(&config.active_streams),
                "thumbnail": to_ids(&config.thumbnail_streams),
                "audio_only": to_ids(&config.audio_only_streams),
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_participant_video_limit(&self, limit: usize) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, _) = self.session_ref().await?;
        self.post(
            &format!("/videosdk/sessions/{}/settings", vendor_ref),
            json!({ "video_limit": limit }),
        )
        .await?;

        if !self.is_destroyed() {
            self.state.write().await.video_limit = Some(limit);
        }
        Ok(())
    }

    async fn enable_audio_only_mode(&self) -> Result<(), VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, _) = self.session_ref().await?;
        self.post(
            &format!("/videosdk/sessions/{}/settings", vendor_ref),
            json!({ "audio_only": true }),
        )
        .await?;

        if !self.is_destroyed() {
            self.state.write().await.audio_only_mode = true;
        }
        Ok(())
    }

    async fn connection_statistics(&self) -> Result<ConnectionStatistics, VideoServiceError> {
        self.ensure_open()?;
        let (vendor_ref, _) = self.session_ref().await?;

        let url = format!(
            "{}/videosdk/sessions/{}/statistics",
            self.base_url, vendor_ref
        );
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.app_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VideoServiceError::Vendor(format!(
                "statistics returned HTTP {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);

        // Absent metrics report as zero rather than being fabricated.
        Ok(ConnectionStatistics {
            participant_count: body["participants"].as_u64().unwrap_or(0) as usize,
            video_streams: body["video_streams"].as_u64().unwrap_or(0) as usize,
            audio_only_participants: body["audio_only"].as_u64().unwrap_or(0) as usize,
            bandwidth_kbps: body["bandwidth_kbps"].as_u64().unwrap_or(0),
            latency_ms: body["latency_ms"].as_u64().unwrap_or(0),
            cpu_percent: body["cpu_percent"].as_f64().unwrap_or(0.0) as f32,
            memory_mb: body["memory_mb"].as_u64().unwrap_or(0),
        })
    }

    async fn render_participant_video(
        &self,
        id: &ParticipantId,
        surface: RenderSurface,
    ) -> Result<RenderState, VideoServiceError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;

        // Idempotent bind: rebinding the same participant replaces the
        // surface without error.
        state.bindings.insert(id.clone(), surface);

        let publishing = state.remote_video_on.contains(id)
            || state
                .session
                .as_ref()
                .map(|s| {
                    s.local_participant.id() == id
                        && s.local_participant.video_state().is_enabled()
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

        let Some(event) = payload["event"].as_str() else {
            warn!("Dropping Zoom payload without event field");
            return;
        };

        match event {
            "session.user_joined" => {
                let user = &payload["payload"]["user"];
                let Some(id) = Self::participant_id_from(&user["id"]) else {
                    warn!("Dropping Zoom user_joined without a usable id");
                    return;
                };
                let name = user["name"].as_str().unwrap_or("unknown");
                let participant =
                    Participant::new(id, name, Self::role_from(&user["role"]));
                self.events
                    .emit_participant(ParticipantEvent::Joined(participant));
            }
            "session.user_left" => {
                let Some(id) = Self::participant_id_from(&payload["payload"]["user"]["id"]) else {
                    warn!("Dropping Zoom user_left without a usable id");
                    return;
                };
                let mut state = self.state.write().await;
                state.remote_video_on.remove(&id);
                state.bindings.remove(&id);
                drop(state);
                self.events.emit_participant(ParticipantEvent::Left(id));
            }
            "session.video_state_updated" => {
                let Some(id) = Self::participant_id_from(&payload["payload"]["user_id"]) else {
                    warn!("Dropping Zoom video state update without a usable id");
                    return;
                };
                let enabled = payload["payload"]["on"].as_bool().unwrap_or(false);
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
            "session.audio_state_updated" => {
                let Some(id) = Self::participant_id_from(&payload["payload"]["user_id"]) else {
                    warn!("Dropping Zoom audio state update without a usable id");
                    return;
                };
                let enabled = payload["payload"]["on"].as_bool().unwrap_or(false);
                self.events.emit_audio(AudioEvent::StateChanged {
                    participant_id: id,
                    enabled,
                });
            }
            "session.active_speaker" => {
                let Some(id) = Self::participant_id_from(&payload["payload"]["user_id"]) else {
                    warn!("Dropping Zoom active speaker without a usable id");
                    return;
                };
                let speaking = payload["payload"]["speaking"].as_bool().unwrap_or(true);
                self.events.emit_audio(AudioEvent::ActiveSpeaker {
                    participant_id: id,
                    speaking,
                });
            }
            "session.network_quality" => {
                let Some(id) = Self::participant_id_from(&payload["payload"]["user_id"]) else {
                    warn!("Dropping Zoom network quality without a usable id");
                    return;
                };
                let score = payload["payload"]["score"].as_f64().unwrap_or(0.0);
                self.events.emit_connection(ConnectionEvent::QualityChanged {
                    participant_id: id,
                    quality: ConnectionQuality::from_score(score),
                });
            }
            "session.connection_updated" => {
                let Some(state) = payload["payload"]["state"]
                    .as_str()
                    .and_then(ConnectionState::parse)
                else {
                    warn!("Dropping Zoom connection update with unknown state");
                    return;
                };
                self.events
                    .emit_connection(ConnectionEvent::StateChanged { state });
            }
            "session.participant_limit" => {
                let limit = payload["payload"]["limit"].as_u64().unwrap_or(0) as usize;
                self.events
                    .emit_scaling(ScalingEvent::ParticipantLimitReached { limit });
            }
            "session.performance_degraded" => {
                let reason = payload["payload"]["reason"]
                    .as_str()
                    .unwrap_or("unspecified")
                    .to_string();
                self.events
                    .emit_scaling(ScalingEvent::DegradedPerformance { reason });
            }
            other => {
                warn!("Dropping unrecognized Zoom event '{}'", other);
            }
        }
    }
}
