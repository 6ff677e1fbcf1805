pub mod backend;
pub mod realtime;

pub use backend::BackendClient;
pub use realtime::{RealtimeHub, RealtimeReceiver, RealtimeSender};
