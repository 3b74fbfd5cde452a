//! Destination management routes.
//!
//! Reads and creation go straight to the destination store. Updates, start,
//! stop and delete go through the reconciler because they may touch external
//! resources.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    CreateDestinationRequest, DeleteDestinationResponse, DestinationResponse, PaginatedResponse,
    PaginationParams, UpdateDestinationRequest,
};
use crate::api::server::AppState;
use crate::database::repositories::DestinationRepository;
use crate::reconciler::Reconciler;

/// Create the destinations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_destinations).post(create_destination))
        .route(
            "/{id}",
            get(get_destination)
                .patch(update_destination)
                .delete(delete_destination),
        )
        .route("/{id}/start", post(start_destination))
        .route("/{id}/stop", post(stop_destination))
}

fn repository(state: &AppState) -> ApiResult<&Arc<dyn DestinationRepository>> {
    state
        .destinations
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Destination store not available"))
}

fn reconciler(state: &AppState) -> ApiResult<&Arc<Reconciler>> {
    state
        .reconciler
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Reconciler not available"))
}

pub async fn list_destinations(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<DestinationResponse>>> {
    let repo = repository(&state)?;
    let limit = pagination.effective_limit();

    let total = repo.count_destinations().await?;
    let items = repo
        .list_destinations_page(limit, pagination.offset)
        .await?
        .iter()
        .map(DestinationResponse::from)
        .collect();

    Ok(Json(PaginatedResponse::new(
        items,
        total,
        limit,
        pagination.offset,
    )))
}

pub async fn create_destination(
    State(state): State<AppState>,
    Json(request): Json<CreateDestinationRequest>,
) -> ApiResult<(StatusCode, Json<DestinationResponse>)> {
    let repo = repository(&state)?;
    let destination = request.into_destination()?;

    repo.create_destination(&destination).await?;
    tracing::info!(
        "Created destination {} ({}, {})",
        destination.id,
        destination.name,
        destination.platform
    );

    Ok((StatusCode::CREATED, Json(destination.into())))
}

pub async fn get_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DestinationResponse>> {
    let destination = repository(&state)?.get_destination(&id).await?;
    Ok(Json(destination.into()))
}

/// Partial update of operator fields.
///
/// Disabling a running destination does not stop it; the next OFFLINE edge or a
/// manual stop does. Ingest changes release or rebuild the pipeline.
pub async fn update_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateDestinationRequest>,
) -> ApiResult<Json<DestinationResponse>> {
    let update = request.into_update()?;
    let destination = reconciler(&state)?
        .update_destination(&id, &update)
        .await?;
    Ok(Json(destination.into()))
}

pub async fn delete_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteDestinationResponse>> {
    let warnings = reconciler(&state)?.delete_destination(&id).await?;
    for warning in &warnings {
        tracing::warn!("Destination {} teardown: {}", id, warning);
    }
    Ok(Json(DeleteDestinationResponse {
        deleted: true,
        warnings,
    }))
}

/// Start one destination regardless of the source state.
pub async fn start_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DestinationResponse>> {
    let destination = reconciler(&state)?.start_destination(&id).await?;
    Ok(Json(destination.into()))
}

/// Stop one destination regardless of the source state.
pub async fn stop_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DestinationResponse>> {
    let destination = reconciler(&state)?.stop_destination(&id).await?;
    Ok(Json(destination.into()))
}
