//! HTTP router

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::registry::SharedHeartbeatRegistry;

use super::handlers::{self, AppState};

/// Build the service router.
///
/// The heartbeat route is GET-only; axum's method router rejects other
/// verbs with 405 before they reach the registry.
pub fn create_router(registry: SharedHeartbeatRegistry) -> Router {
    let state = AppState::new(registry);

    Router::new()
        .route("/heartbeat/{*key}", get(handlers::record_heartbeat))
        .route("/health", get(handlers::health_check))
        .route("/monitoring/entries", get(handlers::list_entries))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
