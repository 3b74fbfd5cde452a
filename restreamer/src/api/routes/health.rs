//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Last recorded source state, if the reconciler is wired and one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_state: Option<String>,
    pub database: &'static str,
}

/// Overall health. The database check goes through the destination store.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.destinations {
        Some(repo) => match repo.count_destinations().await {
            Ok(_) => "healthy",
            Err(e) => {
                tracing::warn!("Health check: destination store unavailable: {}", e);
                "unhealthy"
            }
        },
        None => "unknown",
    };

    let source_state = match &state.reconciler {
        Some(reconciler) => reconciler
            .stored_source_state()
            .await
            .ok()
            .flatten()
            .map(|stored| stored.state.to_string()),
        None => None,
    };

    Json(HealthResponse {
        status: if database == "unhealthy" {
            "degraded"
        } else {
            "healthy"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        source_state,
        database,
    })
}

pub async fn liveness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
