//! Platform catalogue.

use axum::{Json, Router, routing::get};

use crate::api::models::{PlatformResponse, platform_catalogue};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_platforms))
}

pub async fn list_platforms() -> Json<Vec<PlatformResponse>> {
    Json(platform_catalogue())
}
