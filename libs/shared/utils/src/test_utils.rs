use std::sync::Arc;

use shared_config::{AppConfig, VideoProvider};

/// Canonical test configuration. Tests override individual fields and
/// convert with `to_app_config`, so defaults stay in one place.
pub struct TestConfig {
    pub provider: VideoProvider,
    pub app_id: String,
    pub app_secret: Option<String>,
    pub server_url: Option<String>,
    pub backend_url: String,
    pub backend_api_key: String,
    pub max_participants: usize,
    pub allow_unauthenticated_join: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            provider: VideoProvider::Zoom,
            app_id: "test-app-id".to_string(),
            app_secret: Some("test-secret-key-long-enough-for-signing".to_string()),
            server_url: None,
            backend_url: "http://localhost:54321".to_string(),
            backend_api_key: "test-api-key".to_string(),
            max_participants: 100,
            allow_unauthenticated_join: false,
        }
    }
}

impl TestConfig {
    pub fn for_provider(provider: VideoProvider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Points the adapter and backend clients at a local mock server.
    pub fn with_server(mut self, uri: &str) -> Self {
        self.server_url = Some(uri.to_string());
        self.backend_url = uri.to_string();
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.app_secret = None;
        self.allow_unauthenticated_join = true;
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            backend_url: self.backend_url.clone(),
            backend_api_key: self.backend_api_key.clone(),
            video_provider: self.provider,
            video_app_id: self.app_id.clone(),
            video_app_secret: self.app_secret.clone(),
            video_server_url: self.server_url.clone(),
            max_participants: self.max_participants,
            allow_unauthenticated_join: self.allow_unauthenticated_join,
            // Short timeouts keep failing-path tests fast.
            operation_timeout_secs: 5,
            stats_interval_secs: 1,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_provider_validation() {
        let config = TestConfig::default().to_app_config();
        assert!(config.validate_for(VideoProvider::Zoom).is_ok());
    }

    #[test]
    fn unauthenticated_builder_sets_the_opt_in_flag() {
        let config = TestConfig::default().unauthenticated().to_app_config();
        assert!(config.video_app_secret.is_none());
        assert!(config.allow_unauthenticated_join);
        assert!(config.validate_for(VideoProvider::Agora).is_ok());
    }
}
