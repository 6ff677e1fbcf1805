use std::env;
use tracing::warn;

/// Video SDK vendor selected for this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoProvider {
    Zoom,
    Agora,
    WebRtc,
}

impl VideoProvider {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "zoom" => Some(VideoProvider::Zoom),
            "agora" => Some(VideoProvider::Agora),
            "webrtc" => Some(VideoProvider::WebRtc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoProvider::Zoom => "zoom",
            VideoProvider::Agora => "agora",
            VideoProvider::WebRtc => "webrtc",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: String,
    pub backend_api_key: String,
    pub video_provider: VideoProvider,
    pub video_app_id: String,
    pub video_app_secret: Option<String>,
    pub video_server_url: Option<String>,
    pub max_participants: usize,
    pub enable_logging: bool,
    pub region: Option<String>,
    pub allow_unauthenticated_join: bool,
    pub stats_interval_secs: u64,
    pub operation_timeout_secs: u64,
}

impl AppConfig {
    /// Resolves all configuration once at startup. Nothing else in the
    /// system reads environment variables after this call.
    pub fn from_env() -> Self {
        let config = Self {
            backend_url: env::var("BACKEND_URL").unwrap_or_else(|_| {
                warn!("BACKEND_URL not set, using empty value");
                String::new()
            }),
            backend_api_key: env::var("BACKEND_API_KEY").unwrap_or_else(|_| {
                warn!("BACKEND_API_KEY not set, using empty value");
                String::new()
            }),
            video_provider: env::var("VIDEO_PROVIDER")
                .ok()
                .and_then(|raw| {
                    let parsed = VideoProvider::parse(&raw);
                    if parsed.is_none() {
                        warn!("VIDEO_PROVIDER '{}' not recognized, defaulting to webrtc", raw);
                    }
                    parsed
                })
                .unwrap_or(VideoProvider::WebRtc),
            video_app_id: env::var("VIDEO_APP_ID").unwrap_or_else(|_| {
                warn!("VIDEO_APP_ID not set, using empty value");
                String::new()
            }),
            video_app_secret: env::var("VIDEO_APP_SECRET").ok().filter(|s| !s.is_empty()),
            video_server_url: env::var("VIDEO_SERVER_URL").ok().filter(|s| !s.is_empty()),
            max_participants: env::var("MAX_PARTICIPANTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            enable_logging: env::var("ENABLE_VIDEO_LOGGING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            region: env::var("VIDEO_REGION").ok().filter(|s| !s.is_empty()),
            allow_unauthenticated_join: env::var("ALLOW_UNAUTHENTICATED_JOIN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            stats_interval_secs: env::var("STATS_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            operation_timeout_secs: env::var("OPERATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        };

        if !config.is_backend_configured() {
            warn!("Backend store not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_backend_configured(&self) -> bool {
        !self.backend_url.is_empty() && !self.backend_api_key.is_empty()
    }

    pub fn is_video_configured(&self) -> bool {
        match self.video_provider {
            // Mesh WebRTC can run without a vendor application.
            VideoProvider::WebRtc => true,
            _ => !self.video_app_id.is_empty(),
        }
    }

    /// Validates the fields a given provider requires, before any adapter
    /// initialization is attempted.
    pub fn validate_for(&self, provider: VideoProvider) -> Result<(), String> {
        match provider {
            VideoProvider::Zoom | VideoProvider::Agora => {
                if self.video_app_id.is_empty() {
                    return Err(format!(
                        "VIDEO_APP_ID is required for the {} provider",
                        provider.as_str()
                    ));
                }
                if self.video_app_secret.is_none() && !self.allow_unauthenticated_join {
                    return Err(format!(
                        "VIDEO_APP_SECRET is required for the {} provider unless \
                         ALLOW_UNAUTHENTICATED_JOIN is set",
                        provider.as_str()
                    ));
                }
            }
            VideoProvider::WebRtc => {}
        }
        if self.max_participants == 0 {
            return Err("MAX_PARTICIPANTS must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            backend_api_key: String::new(),
            video_provider: VideoProvider::Zoom,
            video_app_id: String::new(),
            video_app_secret: None,
            video_server_url: None,
            max_participants: 100,
            enable_logging: false,
            region: None,
            allow_unauthenticated_join: false,
            stats_interval_secs: 10,
            operation_timeout_secs: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            backend_url: "http://localhost:54321".to_string(),
            backend_api_key: "test-key".to_string(),
            video_provider: VideoProvider::Zoom,
            video_app_id: "app-id".to_string(),
            video_app_secret: Some("secret".to_string()),
            video_server_url: None,
            max_participants: 100,
            enable_logging: false,
            region: None,
            allow_unauthenticated_join: false,
            stats_interval_secs: 10,
            operation_timeout_secs: 15,
        }
    }

    #[test]
    fn provider_parsing() {
        assert_eq!(VideoProvider::parse("Zoom"), Some(VideoProvider::Zoom));
        assert_eq!(VideoProvider::parse("agora"), Some(VideoProvider::Agora));
        assert_eq!(VideoProvider::parse("webrtc"), Some(VideoProvider::WebRtc));
        assert_eq!(VideoProvider::parse("jitsi"), None);
    }

    #[test]
    fn zoom_requires_app_id() {
        let mut config = base_config();
        config.video_app_id = String::new();
        assert!(config.validate_for(VideoProvider::Zoom).is_err());
    }

    #[test]
    fn missing_secret_requires_explicit_opt_in() {
        let mut config = base_config();
        config.video_app_secret = None;
        assert!(config.validate_for(VideoProvider::Agora).is_err());

        config.allow_unauthenticated_join = true;
        assert!(config.validate_for(VideoProvider::Agora).is_ok());
    }

    #[test]
    fn webrtc_needs_no_vendor_application() {
        let mut config = base_config();
        config.video_app_id = String::new();
        config.video_app_secret = None;
        assert!(config.validate_for(VideoProvider::WebRtc).is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = base_config();
        config.max_participants = 0;
        assert!(config.validate_for(VideoProvider::Zoom).is_err());
    }
}
