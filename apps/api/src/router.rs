use std::sync::Arc;

use axum::{routing::get, Router};

use coordination_cell::router::coordination_routes;
use coordination_cell::services::CoordinatorRegistry;

pub fn create_router(registry: Arc<CoordinatorRegistry>) -> Router {
    Router::new()
        .route("/", get(|| async { "ClassLive API is running!" }))
        .nest("/video", coordination_routes(registry))
}
