//! API route modules.
//!
//! Organizes routes by resource type.

pub mod destinations;
pub mod health;
pub mod logging;
pub mod platforms;
pub mod source;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/health", health::router())
        .nest("/api/destinations", destinations::router())
        .nest("/api/source", source::router())
        .nest("/api/logging", logging::router())
        .nest("/api/platforms", platforms::router())
        .with_state(state)
}
