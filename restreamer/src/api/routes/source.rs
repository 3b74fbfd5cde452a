//! Source state routes: persisted state, push notifications and manual polls.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{SourceEventRequest, SourceStateResponse};
use crate::api::server::AppState;
use crate::reconciler::{BatchOutcome, Reconciler};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_source_state))
        .route("/events", post(receive_source_event))
        .route("/poll", post(poll_source))
}

fn reconciler(state: &AppState) -> ApiResult<&Reconciler> {
    state
        .reconciler
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Reconciler not available"))
}

pub async fn get_source_state(
    State(state): State<AppState>,
) -> ApiResult<Json<SourceStateResponse>> {
    let stored = reconciler(&state)?.stored_source_state().await?;
    Ok(Json(stored.into()))
}

/// Push notification. Duplicates and stale events are harmless: edges are
/// computed against the persisted marker.
pub async fn receive_source_event(
    State(state): State<AppState>,
    Json(request): Json<SourceEventRequest>,
) -> ApiResult<Json<BatchOutcome>> {
    let (current, previous) = request.parse()?;
    let outcome = reconciler(&state)?
        .handle_notification(current, previous)
        .await?;
    Ok(Json(outcome))
}

/// Run one poll cycle now instead of waiting for the scheduler.
pub async fn poll_source(State(state): State<AppState>) -> ApiResult<Json<BatchOutcome>> {
    let outcome = reconciler(&state)?.poll_once().await?;
    Ok(Json(outcome))
}
