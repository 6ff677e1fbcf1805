use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use session_cell::{
    DomainError, MediaState, Participant, ParticipantId, SessionStatus, VideoSession,
};
use video_service_cell::{
    AudioEvent, ConnectionEvent, ConnectionStatistics, JoinSessionRequest, ParticipantEvent,
    ScalingEvent, VideoEvent, VideoQuality, VideoService,
};

use crate::models::{ConnectionIssue, CoordinationError, JoinRequest};
use crate::services::store::SessionStore;

/// Folds the five adapter event streams and the command surface into a
/// single observable `VideoSession` snapshot.
///
/// All state transitions go through the immutable aggregate, so a fold
/// that violates a session invariant is logged and dropped instead of
/// corrupting the snapshot. Streams for unrelated participants carry no
/// ordering guarantee between each other, and none is assumed here.
pub struct SessionCoordinator {
    service: Arc<dyn VideoService>,
    store: Arc<dyn SessionStore>,
    snapshot_tx: watch::Sender<VideoSession>,
    issue_tx: watch::Sender<Option<ConnectionIssue>>,
    // Serializes clone-apply-publish so concurrent folds never lose an update.
    fold_lock: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl SessionCoordinator {
    pub fn start(
        session: VideoSession,
        service: Arc<dyn VideoService>,
        store: Arc<dyn SessionStore>,
        stats_interval: Duration,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(session);
        let (issue_tx, _) = watch::channel(None);

        let coordinator = Arc::new(Self {
            service,
            store,
            snapshot_tx,
            issue_tx,
            fold_lock: Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        });

        coordinator.spawn_folds(stats_interval);
        coordinator
    }

    fn spawn_folds(self: &Arc<Self>, stats_interval: Duration) {
        let events = self.service.events();

        let mut handles = Vec::with_capacity(6);

        let this = Arc::clone(self);
        let mut rx = events.subscribe_participant();
        handles.push(tokio::spawn(async move {
            while let Ok(stamped) = rx.recv().await {
                this.fold_participant(stamped.event).await;
            }
            debug!("Participant stream ended");
        }));

        let this = Arc::clone(self);
        let mut rx = events.subscribe_video();
        handles.push(tokio::spawn(async move {
            while let Ok(stamped) = rx.recv().await {
                this.fold_video(stamped.event).await;
            }
        }));

        let this = Arc::clone(self);
        let mut rx = events.subscribe_audio();
        handles.push(tokio::spawn(async move {
            while let Ok(stamped) = rx.recv().await {
                this.fold_audio(stamped.event).await;
            }
        }));

        let this = Arc::clone(self);
        let mut rx = events.subscribe_connection();
        handles.push(tokio::spawn(async move {
            while let Ok(stamped) = rx.recv().await {
                this.fold_connection(stamped.event).await;
            }
        }));

        let this = Arc::clone(self);
        let mut rx = events.subscribe_scaling();
        handles.push(tokio::spawn(async move {
            while let Ok(stamped) = rx.recv().await {
                this.fold_scaling(stamped.event);
            }
        }));

        // Statistics polling runs on its own clock, independent of the
        // event streams.
        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(stats_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if this.is_shut_down() {
                    break;
                }
                match this.service.connection_statistics().await {
                    Ok(stats) => debug!(
                        "Session {}: {} participants, {} video streams, {}ms latency",
                        this.session_id(),
                        stats.participant_count,
                        stats.video_streams,
                        stats.latency_ms
                    ),
                    Err(e) => debug!("Statistics poll failed: {}", e),
                }
            }
        }));

        // start() is the only caller, nothing else holds the lock yet.
        if let Ok(mut tasks) = self.tasks.try_lock() {
            *tasks = handles;
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> String {
        self.snapshot_tx.borrow().id().to_string()
    }

    /// Current snapshot, cloned. Watch for changes with `subscribe`.
    pub fn snapshot(&self) -> VideoSession {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VideoSession> {
        self.snapshot_tx.subscribe()
    }

    pub fn connection_issue(&self) -> Option<ConnectionIssue> {
        self.issue_tx.borrow().clone()
    }

    pub fn subscribe_issues(&self) -> watch::Receiver<Option<ConnectionIssue>> {
        self.issue_tx.subscribe()
    }

    /// Applies a pure transition to the snapshot and publishes the
    /// result. Returns the new snapshot.
    async fn apply<F>(&self, transition: F) -> Result<VideoSession, DomainError>
    where
        F: FnOnce(&VideoSession) -> Result<VideoSession, DomainError>,
    {
        let _guard = self.fold_lock.lock().await;
        let current = self.snapshot_tx.borrow().clone();
        let next = transition(&current)?;
        self.snapshot_tx.send_replace(next.clone());
        Ok(next)
    }

    /// Like `apply`, but guard violations are expected from racy remote
    /// events and only logged.
    async fn fold<F>(&self, context: &str, transition: F) -> Option<VideoSession>
    where
        F: FnOnce(&VideoSession) -> Result<VideoSession, DomainError>,
    {
        if self.is_shut_down() {
            return None;
        }
        match self.apply(transition).await {
            Ok(next) => Some(next),
            Err(e) => {
                warn!("Dropping {}: {}", context, e);
                None
            }
        }
    }

    async fn fold_participant(&self, event: ParticipantEvent) {
        match event {
            ParticipantEvent::Joined(participant) => {
                let id = participant.id().clone();
                let folded = self
                    .fold("remote join", |s| s.add_participant(participant.clone()))
                    .await;
                if folded.is_some() {
                    if let Err(e) = self.store.record_join(&self.snapshot().id().clone(), &participant).await {
                        warn!("Failed to persist join of {}: {}", id, e);
                    }
                }
            }
            ParticipantEvent::Left(id) => {
                let before = self.snapshot().status();
                let folded = self.fold("remote leave", |s| s.remove_participant(&id)).await;
                if let Some(next) = folded {
                    if let Err(e) = self.store.record_leave(next.id(), id.as_str()).await {
                        warn!("Failed to persist leave of {}: {}", id, e);
                    }
                    // Coach departure ends the session.
                    if before != SessionStatus::Ended && next.status() == SessionStatus::Ended {
                        info!("Session {} ended by coach departure", next.id());
                        if let Err(e) = self.store.upsert_session(&next).await {
                            warn!("Failed to persist session end: {}", e);
                        }
                    }
                }
            }
            ParticipantEvent::Updated(participant) => {
                let id = participant.id().clone();
                self.fold("remote update", |s| {
                    s.update_participant(&id, |_| participant.clone())
                })
                .await;
            }
        }
    }

    async fn fold_video(&self, event: VideoEvent) {
        let VideoEvent::StateChanged { participant_id, enabled } = event;
        let media = if enabled { MediaState::Enabled } else { MediaState::Disabled };
        self.fold("video state change", |s| {
            s.update_participant(&participant_id, |p| p.with_video(media))
        })
        .await;
    }

    async fn fold_audio(&self, event: AudioEvent) {
        match event {
            AudioEvent::StateChanged { participant_id, enabled } => {
                let media = if enabled { MediaState::Enabled } else { MediaState::Disabled };
                self.fold("audio state change", |s| {
                    s.update_participant(&participant_id, |p| p.with_audio(media))
                })
                .await;
            }
            AudioEvent::ActiveSpeaker { participant_id, speaking } => {
                self.fold("active speaker change", |s| {
                    s.update_participant(&participant_id, |p| p.with_active_speaker(speaking))
                })
                .await;
            }
        }
    }

    async fn fold_connection(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged { state } => {
                if self.is_shut_down() {
                    return;
                }
                if state.is_troubled() {
                    // Observable error state only; reconnection stays an
                    // explicit caller decision.
                    warn!("Session {} connection trouble: {:?}", self.session_id(), state);
                    self.issue_tx.send_replace(Some(ConnectionIssue::new(state)));
                } else {
                    self.issue_tx.send_replace(None);
                }
            }
            ConnectionEvent::QualityChanged { participant_id, quality } => {
                self.fold("quality change", |s| {
                    s.update_participant(&participant_id, |p| p.with_connection_quality(quality))
                })
                .await;
            }
        }
    }

    fn fold_scaling(&self, event: ScalingEvent) {
        match event {
            ScalingEvent::ParticipantLimitReached { limit } => {
                warn!("Session {} hit the provider participant limit {}", self.session_id(), limit);
            }
            ScalingEvent::DegradedPerformance { reason } => {
                warn!("Session {} degraded: {}", self.session_id(), reason);
            }
        }
    }

    fn ensure_running(&self) -> Result<(), CoordinationError> {
        if self.is_shut_down() {
            return Err(CoordinationError::ShutDown);
        }
        Ok(())
    }

    fn ensure_coach_controls(&self, what: &'static str) -> Result<(), CoordinationError> {
        if !self.service.capabilities().supports_coach_controls {
            return Err(CoordinationError::Unsupported(what));
        }
        Ok(())
    }

    /// Joins the local participant: vendor first, then the aggregate.
    /// Guards are pre-checked so a doomed join never reaches the vendor.
    pub async fn join(&self, request: JoinRequest) -> Result<Participant, CoordinationError> {
        self.ensure_running()?;

        let session_id = self.snapshot().id().clone();
        // Pre-flight the guards with a throwaway candidate; the vendor
        // assigns the real id, so a generated one keeps the duplicate
        // check from colliding with anyone already in the session.
        let candidate = Participant::new(
            ParticipantId::generate(),
            request.participant_name.clone(),
            request.role,
        );
        self.snapshot().can_add_participant(&candidate)?;

        let mut join = JoinSessionRequest::new(session_id, request.participant_name, request.role);
        join.video_enabled = request.video_enabled;
        join.audio_enabled = request.audio_enabled;

        let result = self.service.join_session(join).await?;
        let participant = result.participant.clone();

        let next = self
            .apply(|s| s.add_participant(result.participant.clone()))
            .await?;
        if let Err(e) = self.store.record_join(next.id(), &participant).await {
            warn!("Failed to persist join: {}", e);
        }
        if let Err(e) = self.store.upsert_session(&next).await {
            warn!("Failed to persist session state: {}", e);
        }
        Ok(participant)
    }

    pub async fn leave(&self, participant_id: &ParticipantId) -> Result<(), CoordinationError> {
        self.ensure_running()?;
        self.service.leave_session().await?;

        let next = self.apply(|s| s.remove_participant(participant_id)).await?;
        if let Err(e) = self.store.record_leave(next.id(), participant_id.as_str()).await {
            warn!("Failed to persist leave: {}", e);
        }
        if next.status() == SessionStatus::Ended {
            if let Err(e) = self.store.upsert_session(&next).await {
                warn!("Failed to persist session end: {}", e);
            }
        }
        Ok(())
    }

    pub async fn set_media(
        &self,
        participant_id: &ParticipantId,
        video: Option<bool>,
        audio: Option<bool>,
    ) -> Result<(), CoordinationError> {
        self.ensure_running()?;

        if let Some(video) = video {
            if video {
                self.service.enable_video().await?;
            } else {
                self.service.disable_video().await?;
            }
        }
        if let Some(audio) = audio {
            if audio {
                self.service.enable_audio().await?;
            } else {
                self.service.disable_audio().await?;
            }
        }

        self.apply(|s| {
            s.update_participant(participant_id, |p| {
                let mut p = p.clone();
                if let Some(video) = video {
                    p = p.with_video(if video { MediaState::Enabled } else { MediaState::Disabled });
                }
                if let Some(audio) = audio {
                    p = p.with_audio(if audio { MediaState::Enabled } else { MediaState::Disabled });
                }
                p
            })
        })
        .await?;
        Ok(())
    }

    pub async fn set_video_quality(&self, quality: VideoQuality) -> Result<(), CoordinationError> {
        self.ensure_running()?;
        self.service.set_video_quality(quality).await?;
        Ok(())
    }

    pub async fn spotlight(&self, participant_id: &ParticipantId) -> Result<(), CoordinationError> {
        self.ensure_running()?;
        self.ensure_coach_controls("spotlight")?;

        // Validate against the aggregate before touching the vendor.
        self.snapshot().spotlight_participant(participant_id)?;
        self.service.spotlight_participant(participant_id).await?;
        self.apply(|s| s.spotlight_participant(participant_id)).await?;
        Ok(())
    }

    pub async fn clear_spotlight(&self) -> Result<(), CoordinationError> {
        self.ensure_running()?;
        self.ensure_coach_controls("spotlight")?;

        self.service.clear_spotlight().await?;
        self.apply(|s| Ok(s.clear_spotlight())).await?;
        Ok(())
    }

    pub async fn mute(&self, participant_id: &ParticipantId) -> Result<(), CoordinationError> {
        self.ensure_running()?;
        self.ensure_coach_controls("muting participants")?;

        self.service.mute_participant(participant_id).await?;
        self.apply(|s| {
            s.update_participant(participant_id, |p| p.with_audio(MediaState::Disabled))
        })
        .await?;
        Ok(())
    }

    pub async fn remove(&self, participant_id: &ParticipantId) -> Result<(), CoordinationError> {
        self.ensure_running()?;
        self.ensure_coach_controls("removing participants")?;

        self.service.remove_participant(participant_id).await?;
        let next = self.apply(|s| s.remove_participant(participant_id)).await?;
        if let Err(e) = self.store.record_leave(next.id(), participant_id.as_str()).await {
            warn!("Failed to persist removal: {}", e);
        }
        Ok(())
    }

    /// Ends the session for everyone. Idempotent, like the aggregate
    /// transition it folds.
    pub async fn end(&self) -> Result<(), CoordinationError> {
        self.ensure_running()?;

        let next = self.apply(|s| Ok(s.end())).await?;
        if let Err(e) = self.store.upsert_session(&next).await {
            warn!("Failed to persist session end: {}", e);
        }
        self.service.leave_session().await?;
        Ok(())
    }

    /// Applies a scaling plan: derives the stream plan from the current
    /// priority order and pushes it to the provider, optionally bounding
    /// decoded streams or dropping to audio only.
    pub async fn apply_scaling(
        &self,
        active_budget: usize,
        thumbnail_budget: usize,
        video_limit: Option<usize>,
        audio_only: bool,
    ) -> Result<session_cell::StreamPlan, CoordinationError> {
        self.ensure_running()?;
        if !self.service.capabilities().supports_selective_streaming {
            return Err(CoordinationError::Unsupported("selective streaming"));
        }

        let plan = self.snapshot().stream_plan(active_budget, thumbnail_budget);
        self.service
            .enable_selective_streaming(plan.clone().into())
            .await?;
        if let Some(limit) = video_limit {
            self.service.set_participant_video_limit(limit).await?;
        }
        if audio_only {
            self.service.enable_audio_only_mode().await?;
        }
        Ok(plan)
    }

    pub async fn statistics(&self) -> Result<ConnectionStatistics, CoordinationError> {
        self.ensure_running()?;
        Ok(self.service.connection_statistics().await?)
    }

    /// Forwards a raw vendor push payload to the adapter.
    pub async fn ingest_vendor_event(&self, payload: serde_json::Value) {
        if self.is_shut_down() {
            return;
        }
        self.service.ingest_vendor_event(payload).await;
    }

    /// Stops the fold and poll tasks and destroys the underlying
    /// service. Event deliveries racing shutdown are discarded.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down coordinator for session {}", self.session_id());

        if let Err(e) = self.service.destroy().await {
            error!("Video service destroy failed: {}", e);
        }

        // Destroy closes the event streams, so the fold tasks finish on
        // their own; aborting just bounds the wait.
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}
