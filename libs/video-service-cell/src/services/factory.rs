use std::sync::Arc;
use tracing::{info, warn};

use shared_config::{AppConfig, VideoProvider};

use crate::error::VideoServiceError;
use crate::models::{ServiceCapabilities, VideoServiceConfig};
use crate::service::VideoService;
use crate::services::agora::AgoraVideoService;
use crate::services::webrtc::WebRtcVideoService;
use crate::services::zoom::ZoomVideoService;
use crate::token::{HmacTokenSigner, JoinTokenSigner, JwtTokenSigner, UnauthenticatedTokens};

/// Builds the configured provider behind the `VideoService` trait. The
/// caller never sees a concrete adapter; feature differences surface
/// through `capabilities()` only.
#[derive(Debug)]
pub struct VideoServiceFactory {
    provider: VideoProvider,
    config: VideoServiceConfig,
}

impl VideoServiceFactory {
    pub fn new(app_config: &AppConfig) -> Result<Self, VideoServiceError> {
        let provider = app_config.video_provider;
        app_config
            .validate_for(provider)
            .map_err(VideoServiceError::Validation)?;

        if app_config.video_app_secret.is_none() && provider != VideoProvider::WebRtc {
            warn!(
                "No video app secret configured; {} sessions will be joined unauthenticated",
                provider.as_str()
            );
        }

        Ok(Self {
            provider,
            config: VideoServiceConfig::from(app_config),
        })
    }

    pub fn provider(&self) -> VideoProvider {
        self.provider
    }

    /// Capabilities of the configured provider, available without
    /// instantiating an adapter.
    pub fn capabilities(&self) -> ServiceCapabilities {
        match self.provider {
            VideoProvider::Zoom => ZoomVideoService::static_capabilities(),
            VideoProvider::Agora => AgoraVideoService::static_capabilities(),
            VideoProvider::WebRtc => WebRtcVideoService::static_capabilities(),
        }
    }

    pub fn create(&self) -> Result<Arc<dyn VideoService>, VideoServiceError> {
        info!("Creating {} video service", self.provider.as_str());
        let service: Arc<dyn VideoService> = match self.provider {
            VideoProvider::Zoom => Arc::new(ZoomVideoService::new(
                self.config.clone(),
                self.signer_for(self.provider),
            )?),
            VideoProvider::Agora => Arc::new(AgoraVideoService::new(
                self.config.clone(),
                self.signer_for(self.provider),
            )?),
            VideoProvider::WebRtc => Arc::new(WebRtcVideoService::new(self.config.clone())?),
        };
        Ok(service)
    }

    fn signer_for(&self, provider: VideoProvider) -> Arc<dyn JoinTokenSigner> {
        match &self.config.app_secret {
            Some(secret) => match provider {
                VideoProvider::Zoom => {
                    Arc::new(JwtTokenSigner::new(self.config.app_id.clone(), secret.clone()))
                }
                VideoProvider::Agora => {
                    Arc::new(HmacTokenSigner::new(self.config.app_id.clone(), secret.clone()))
                }
                VideoProvider::WebRtc => Arc::new(UnauthenticatedTokens),
            },
            None => Arc::new(UnauthenticatedTokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn base_config() -> AppConfig {
        AppConfig {
            video_provider: VideoProvider::Zoom,
            video_app_id: "app-123".to_string(),
            video_app_secret: Some("secret".to_string()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn missing_secret_without_opt_in_is_rejected() {
        let mut config = base_config();
        config.video_app_secret = None;
        config.allow_unauthenticated_join = false;

        assert_matches!(
            VideoServiceFactory::new(&config),
            Err(VideoServiceError::Validation(_))
        );
    }

    #[test]
    fn missing_secret_with_opt_in_uses_unauthenticated_tokens() {
        let mut config = base_config();
        config.video_app_secret = None;
        config.allow_unauthenticated_join = true;

        let factory = VideoServiceFactory::new(&config).unwrap();
        assert_eq!(
            factory.signer_for(VideoProvider::Zoom).mode(),
            "unauthenticated"
        );
    }

    #[test]
    fn zoom_uses_jwt_and_agora_uses_hmac() {
        let mut config = base_config();
        let factory = VideoServiceFactory::new(&config).unwrap();
        assert_eq!(factory.signer_for(VideoProvider::Zoom).mode(), "jwt");

        config.video_provider = VideoProvider::Agora;
        let factory = VideoServiceFactory::new(&config).unwrap();
        assert_eq!(factory.signer_for(VideoProvider::Agora).mode(), "hmac");
    }

    #[test]
    fn capabilities_reflect_the_configured_provider() {
        let mut config = base_config();
        config.video_provider = VideoProvider::WebRtc;
        let factory = VideoServiceFactory::new(&config).unwrap();

        let caps = factory.capabilities();
        assert_eq!(caps.provider, "webrtc");
        assert!(!caps.supports_coach_controls);
    }

    #[test]
    fn created_service_matches_the_provider() {
        let factory = VideoServiceFactory::new(&base_config()).unwrap();
        let service = factory.create().unwrap();
        assert_eq!(service.capabilities().provider, "zoom");
    }
}
