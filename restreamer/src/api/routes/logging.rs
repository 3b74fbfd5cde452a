//! Logging API routes.
//!
//! View and change the runtime log filter.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::{LoggingConfig, available_modules};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub log_dir: String,
    /// `0` means rotated files are kept forever.
    pub retention_days: u32,
    pub available_modules: Vec<ModuleInfo>,
}

fn logging_config(state: &AppState) -> ApiResult<&LoggingConfig> {
    state
        .logging_config
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))
}

fn response(config: &LoggingConfig) -> LoggingConfigResponse {
    LoggingConfigResponse {
        filter: config.get_filter(),
        log_dir: config.log_dir().display().to_string(),
        retention_days: config.retention_days(),
        available_modules: available_modules()
            .into_iter()
            .map(|(name, desc)| ModuleInfo {
                name: name.to_string(),
                description: desc.to_string(),
            })
            .collect(),
    }
}

pub async fn get_logging_config(
    State(state): State<AppState>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    Ok(Json(response(logging_config(&state)?)))
}

pub async fn update_logging_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let config = logging_config(&state)?;
    config.set_filter(&request.filter)?;
    tracing::info!("Log filter changed to '{}'", request.filter);
    Ok(Json(response(config)))
}
