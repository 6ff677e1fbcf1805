use chrono::{DateTime, Utc};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use session_cell::{ConnectionQuality, Participant, ParticipantId};

use crate::models::ConnectionState;

const STREAM_CAPACITY: usize = 256;

/// An event entry with its emission timestamp.
#[derive(Debug, Clone)]
pub struct Timestamped<T> {
    pub at: DateTime<Utc>,
    pub event: T,
}

impl<T> Timestamped<T> {
    pub fn now(event: T) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParticipantEvent {
    Joined(Participant),
    Left(ParticipantId),
    Updated(Participant),
}

#[derive(Debug, Clone)]
pub enum VideoEvent {
    StateChanged {
        participant_id: ParticipantId,
        enabled: bool,
    },
}

#[derive(Debug, Clone)]
pub enum AudioEvent {
    StateChanged {
        participant_id: ParticipantId,
        enabled: bool,
    },
    ActiveSpeaker {
        participant_id: ParticipantId,
        speaking: bool,
    },
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged {
        state: ConnectionState,
    },
    QualityChanged {
        participant_id: ParticipantId,
        quality: ConnectionQuality,
    },
}

#[derive(Debug, Clone)]
pub enum ScalingEvent {
    ParticipantLimitReached { limit: usize },
    DegradedPerformance { reason: String },
}

struct Channels {
    participant: broadcast::Sender<Timestamped<ParticipantEvent>>,
    video: broadcast::Sender<Timestamped<VideoEvent>>,
    audio: broadcast::Sender<Timestamped<AudioEvent>>,
    connection: broadcast::Sender<Timestamped<ConnectionEvent>>,
    scaling: broadcast::Sender<Timestamped<ScalingEvent>>,
}

/// The five independent event streams every adapter publishes on.
/// Ordering is guaranteed within a stream, never across streams. Closing
/// drops the senders, so every receiver observes end-of-stream and no
/// event can be emitted afterwards.
pub struct EventStreams {
    inner: RwLock<Option<Channels>>,
}

impl EventStreams {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Some(Channels {
                participant: broadcast::channel(STREAM_CAPACITY).0,
                video: broadcast::channel(STREAM_CAPACITY).0,
                audio: broadcast::channel(STREAM_CAPACITY).0,
                connection: broadcast::channel(STREAM_CAPACITY).0,
                scaling: broadcast::channel(STREAM_CAPACITY).0,
            })),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().expect("event stream lock").is_none()
    }

    /// Terminates all five streams. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.write().expect("event stream lock");
        if inner.take().is_some() {
            debug!("Event streams closed");
        }
    }

    fn dead_receiver<T: Clone>() -> broadcast::Receiver<T> {
        let (sender, receiver) = broadcast::channel(1);
        drop(sender);
        receiver
    }

    pub fn subscribe_participant(&self) -> broadcast::Receiver<Timestamped<ParticipantEvent>> {
        match self.inner.read().expect("event stream lock").as_ref() {
            Some(channels) => channels.participant.subscribe(),
            None => Self::dead_receiver(),
        }
    }

    pub fn subscribe_video(&self) -> broadcast::Receiver<Timestamped<VideoEvent>> {
        match self.inner.read().expect("event stream lock").as_ref() {
            Some(channels) => channels.video.subscribe(),
            None => Self::dead_receiver(),
        }
    }

    pub fn subscribe_audio(&self) -> broadcast::Receiver<Timestamped<AudioEvent>> {
        match self.inner.read().expect("event stream lock").as_ref() {
            Some(channels) => channels.audio.subscribe(),
            None => Self::dead_receiver(),
        }
    }

    pub fn subscribe_connection(&self) -> broadcast::Receiver<Timestamped<ConnectionEvent>> {
        match self.inner.read().expect("event stream lock").as_ref() {
            Some(channels) => channels.connection.subscribe(),
            None => Self::dead_receiver(),
        }
    }

    pub fn subscribe_scaling(&self) -> broadcast::Receiver<Timestamped<ScalingEvent>> {
        match self.inner.read().expect("event stream lock").as_ref() {
            Some(channels) => channels.scaling.subscribe(),
            None => Self::dead_receiver(),
        }
    }

    pub fn emit_participant(&self, event: ParticipantEvent) {
        if let Some(channels) = self.inner.read().expect("event stream lock").as_ref() {
            let _ = channels.participant.send(Timestamped::now(event));
        }
    }

    pub fn emit_video(&self, event: VideoEvent) {
        if let Some(channels) = self.inner.read().expect("event stream lock").as_ref() {
            let _ = channels.video.send(Timestamped::now(event));
        }
    }

    pub fn emit_audio(&self, event: AudioEvent) {
        if let Some(channels) = self.inner.read().expect("event stream lock").as_ref() {
            let _ = channels.audio.send(Timestamped::now(event));
        }
    }

    pub fn emit_connection(&self, event: ConnectionEvent) {
        if let Some(channels) = self.inner.read().expect("event stream lock").as_ref() {
            let _ = channels.connection.send(Timestamped::now(event));
        }
    }

    pub fn emit_scaling(&self, event: ScalingEvent) {
        if let Some(channels) = self.inner.read().expect("event stream lock").as_ref() {
            let _ = channels.scaling.send(Timestamped::now(event));
        }
    }
}

impl Default for EventStreams {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_cell::{ParticipantRole, Participant};

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let streams = EventStreams::new();
        let mut rx = streams.subscribe_video();

        for enabled in [true, false, true] {
            streams.emit_video(VideoEvent::StateChanged {
                participant_id: ParticipantId::new("p1").unwrap(),
                enabled,
            });
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let VideoEvent::StateChanged { enabled, .. } = rx.recv().await.unwrap().event;
            seen.push(enabled);
        }
        assert_eq!(seen, vec![true, false, true]);
    }

    #[tokio::test]
    async fn close_terminates_streams_and_silences_emission() {
        let streams = EventStreams::new();
        let mut rx = streams.subscribe_participant();

        streams.close();
        streams.emit_participant(ParticipantEvent::Joined(Participant::new(
            ParticipantId::new("p1").unwrap(),
            "Late",
            ParticipantRole::Student,
        )));

        assert!(rx.recv().await.is_err());
        assert!(streams.is_closed());

        // Subscribing after close yields an already-terminated stream.
        let mut late = streams.subscribe_scaling();
        assert!(late.recv().await.is_err());
    }

    #[test]
    fn entries_are_timestamped() {
        let before = Utc::now();
        let stamped = Timestamped::now(ScalingEvent::ParticipantLimitReached { limit: 25 });
        assert!(stamped.at >= before);
    }
}
