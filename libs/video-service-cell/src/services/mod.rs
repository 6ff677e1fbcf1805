pub mod agora;
pub mod factory;
pub mod webrtc;
pub mod zoom;

pub use agora::AgoraVideoService;
pub use factory::VideoServiceFactory;
pub use webrtc::WebRtcVideoService;
pub use zoom::ZoomVideoService;
