use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

pub type RealtimeSender = broadcast::Sender<String>;
pub type RealtimeReceiver = broadcast::Receiver<String>;

/// Per-session realtime channels used to fan session events out to other
/// connected clients. Payloads are the serialized wire events.
pub struct RealtimeHub {
    channels: Arc<RwLock<HashMap<String, RealtimeSender>>>,
    global_sender: RealtimeSender,
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(1000);

        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            global_sender,
        }
    }

    pub async fn subscribe(&self, session_id: &str) -> RealtimeReceiver {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(256).0);
        sender.subscribe()
    }

    pub async fn publish(&self, session_id: &str, payload: String) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(session_id) {
            // Send only fails when no receiver is subscribed.
            let _ = sender.send(payload.clone());
        }
        let _ = self.global_sender.send(payload);
    }

    pub async fn remove_channel(&self, session_id: &str) {
        let mut channels = self.channels.write().await;
        channels.remove(session_id);
        debug!("Removed realtime channel for session {}", session_id);
    }

    pub fn subscribe_global(&self) -> RealtimeReceiver {
        self.global_sender.subscribe()
    }

    pub async fn active_channels(&self) -> Vec<String> {
        let channels = self.channels.read().await;
        channels.keys().cloned().collect()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_session_subscribers() {
        let hub = RealtimeHub::new();
        let mut rx = hub.subscribe("class-1").await;

        hub.publish("class-1", "joined".to_string()).await;

        assert_eq!(rx.recv().await.unwrap(), "joined");
    }

    #[tokio::test]
    async fn global_subscribers_see_all_sessions() {
        let hub = RealtimeHub::new();
        let _session_rx = hub.subscribe("class-1").await;
        let mut global = hub.subscribe_global();

        hub.publish("class-1", "left".to_string()).await;

        assert_eq!(global.recv().await.unwrap(), "left");
    }
}
