pub mod coordinator;
pub mod registry;
pub mod store;

pub use coordinator::SessionCoordinator;
pub use registry::CoordinatorRegistry;
pub use store::{NullSessionStore, RestSessionStore, SessionStore};
