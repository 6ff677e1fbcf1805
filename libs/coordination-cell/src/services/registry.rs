use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use session_cell::{SessionId, VideoSession};
use shared_config::AppConfig;
use shared_database::{BackendClient, RealtimeHub};
use video_service_cell::VideoServiceFactory;

use crate::models::CoordinationError;
use crate::services::coordinator::SessionCoordinator;
use crate::services::store::{NullSessionStore, RestSessionStore, SessionStore};

/// Owns the live coordinators, one per session. Handlers resolve a
/// session id to its coordinator here.
pub struct CoordinatorRegistry {
    config: Arc<AppConfig>,
    factory: VideoServiceFactory,
    realtime: Arc<RealtimeHub>,
    coordinators: RwLock<HashMap<SessionId, Arc<SessionCoordinator>>>,
}

impl CoordinatorRegistry {
    pub fn new(config: Arc<AppConfig>) -> Result<Self, CoordinationError> {
        let factory = VideoServiceFactory::new(&config)?;
        Ok(Self {
            config,
            factory,
            realtime: Arc::new(RealtimeHub::new()),
            coordinators: RwLock::new(HashMap::new()),
        })
    }

    pub fn factory(&self) -> &VideoServiceFactory {
        &self.factory
    }

    pub fn realtime(&self) -> Arc<RealtimeHub> {
        Arc::clone(&self.realtime)
    }

    fn store(&self) -> Arc<dyn SessionStore> {
        if self.config.is_backend_configured() {
            Arc::new(RestSessionStore::new(
                BackendClient::new(&self.config),
                Arc::clone(&self.realtime),
            ))
        } else {
            Arc::new(NullSessionStore)
        }
    }

    /// Creates a session and starts its coordinator.
    pub async fn create_session(
        &self,
        name: &str,
        max_participants: Option<usize>,
        allow_late_join: bool,
    ) -> Result<Arc<SessionCoordinator>, CoordinationError> {
        let capacity = max_participants
            .unwrap_or(self.config.max_participants)
            .min(self.factory.capabilities().max_participants);
        let session = VideoSession::new(SessionId::generate(), name, capacity, allow_late_join);
        let session_id = session.id().clone();

        let service = self.factory.create()?;
        service.initialize().await?;

        let coordinator = SessionCoordinator::start(
            session,
            service,
            self.store(),
            Duration::from_secs(self.config.stats_interval_secs),
        );

        info!("Created session {} ({})", session_id, name);
        self.coordinators
            .write()
            .await
            .insert(session_id, Arc::clone(&coordinator));
        Ok(coordinator)
    }

    pub async fn get(&self, id: &SessionId) -> Result<Arc<SessionCoordinator>, CoordinationError> {
        self.coordinators
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(CoordinationError::SessionNotFound)
    }

    /// Shuts a coordinator down and forgets it.
    pub async fn drop_session(&self, id: &SessionId) -> Result<(), CoordinationError> {
        let coordinator = self
            .coordinators
            .write()
            .await
            .remove(id)
            .ok_or(CoordinationError::SessionNotFound)?;
        coordinator.shutdown().await;
        self.realtime.remove_channel(id.as_str()).await;
        Ok(())
    }

    pub async fn active_session_ids(&self) -> Vec<SessionId> {
        self.coordinators.read().await.keys().cloned().collect()
    }

    /// Fans a vendor push payload out to every live coordinator. The
    /// adapters drop payloads that do not concern them.
    pub async fn ingest_vendor_event(&self, payload: serde_json::Value) {
        let coordinators: Vec<_> = self.coordinators.read().await.values().cloned().collect();
        for coordinator in coordinators {
            coordinator.ingest_vendor_event(payload.clone()).await;
        }
    }
}
