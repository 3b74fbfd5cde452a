//! API request and response models.
//!
//! - **Pagination**: list parameters and the page wrapper
//! - **Destination**: create, update and the masked response
//! - **Source**: push notifications and the persisted state
//! - **Platform**: the static platform catalogue

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::api::error::ApiError;
use crate::database::models::StoredSourceState;
use crate::domain::{
    Destination, DestinationStatus, DestinationUpdate, Platform, SourceState, StreamKey,
    VerticalMode,
};

// ============================================================================
// Pagination
// ============================================================================

/// Pagination parameters for list endpoints.
///
/// `limit` defaults to 20 and is capped at 100.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

pub const MAX_PAGE_LIMIT: u32 = 100;

impl PaginationParams {
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Paginated response wrapper for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, limit: u32, offset: u32) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

// ============================================================================
// Destination DTOs
// ============================================================================

/// Request to create a destination.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDestinationRequest {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub name: String,
    /// Falls back to the platform's well-known endpoint when omitted.
    #[serde(default)]
    pub ingest_url: Option<String>,
    #[serde(default)]
    pub stream_key: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub vertical_mode: Option<String>,
}

impl CreateDestinationRequest {
    /// Validate and build a new inactive destination.
    pub fn into_destination(self) -> Result<Destination, ApiError> {
        let platform = parse_platform(&self.platform)?;
        let name = required_text("name", &self.name)?;
        let stream_key = required_text("stream_key", &self.stream_key)?;

        let ingest_url = match self.ingest_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => platform
                .default_ingest_url()
                .map(str::to_string)
                .ok_or_else(|| {
                    ApiError::validation(format!("ingest_url is required for platform {platform}"))
                })?,
        };
        validate_ingest_url(&ingest_url)?;

        let vertical_mode = match self.vertical_mode.as_deref() {
            Some(mode) => parse_vertical_mode(mode)?,
            None => VerticalMode::default(),
        };

        Ok(
            Destination::new(platform, name, ingest_url, StreamKey::new(stream_key))
                .with_enabled(self.enabled.unwrap_or(true))
                .with_vertical_mode(vertical_mode),
        )
    }
}

/// Partial update of operator-owned fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDestinationRequest {
    pub name: Option<String>,
    pub ingest_url: Option<String>,
    pub stream_key: Option<String>,
    pub enabled: Option<bool>,
    pub vertical_mode: Option<String>,
}

impl UpdateDestinationRequest {
    pub fn into_update(self) -> Result<DestinationUpdate, ApiError> {
        let update = DestinationUpdate {
            name: self
                .name
                .as_deref()
                .map(|n| required_text("name", n))
                .transpose()?,
            ingest_url: match self.ingest_url.as_deref() {
                Some(url) => {
                    let url = url.trim();
                    validate_ingest_url(url)?;
                    Some(url.to_string())
                }
                None => None,
            },
            stream_key: self
                .stream_key
                .as_deref()
                .map(|k| required_text("stream_key", k).map(StreamKey::new))
                .transpose()?,
            enabled: self.enabled,
            vertical_mode: self
                .vertical_mode
                .as_deref()
                .map(parse_vertical_mode)
                .transpose()?,
        };

        if update.is_empty() {
            return Err(ApiError::validation("No fields to update"));
        }
        Ok(update)
    }
}

/// Destination as returned by the API. The stream key is masked.
#[derive(Debug, Clone, Serialize)]
pub struct DestinationResponse {
    pub id: String,
    pub platform: Platform,
    pub name: String,
    pub ingest_url: String,
    pub stream_key: String,
    pub enabled: bool,
    pub vertical_mode: VerticalMode,
    pub is_vertical: bool,
    pub status: DestinationStatus,
    pub pipeline_channel_ref: Option<String>,
    pub pipeline_input_ref: Option<String>,
    /// The last start failed and is retried while the source is LIVE.
    pub start_retry: bool,
    /// The pipeline predates an ingest change and is rebuilt on the next start.
    pub pipeline_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Destination> for DestinationResponse {
    fn from(dest: &Destination) -> Self {
        Self {
            id: dest.id.clone(),
            platform: dest.platform,
            name: dest.name.clone(),
            ingest_url: dest.ingest_url.clone(),
            stream_key: dest.stream_key.masked(),
            enabled: dest.enabled,
            vertical_mode: dest.vertical_mode,
            is_vertical: dest.platform.is_vertical(),
            status: dest.status,
            pipeline_channel_ref: dest.pipeline_channel_ref.clone(),
            pipeline_input_ref: dest.pipeline_input_ref.clone(),
            start_retry: dest.start_retry,
            pipeline_stale: dest.pipeline_stale,
            created_at: dest.created_at,
            updated_at: dest.updated_at,
        }
    }
}

impl From<Destination> for DestinationResponse {
    fn from(dest: Destination) -> Self {
        Self::from(&dest)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteDestinationResponse {
    pub deleted: bool,
    /// Teardown steps that failed; the record is gone regardless.
    pub warnings: Vec<String>,
}

// ============================================================================
// Source DTOs
// ============================================================================

/// Push notification from the source platform.
///
/// Both `LIVE`/`OFFLINE` and event names such as `stream_started` are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEventRequest {
    pub state: String,
    #[serde(default)]
    pub previous_state: Option<String>,
}

impl SourceEventRequest {
    pub fn parse(&self) -> Result<(SourceState, Option<SourceState>), ApiError> {
        let current = parse_source_state(&self.state)?;
        let previous = self
            .previous_state
            .as_deref()
            .map(parse_source_state)
            .transpose()?;
        Ok((current, previous))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStateResponse {
    pub state: SourceState,
    /// When the state was last recorded; absent if it never was.
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Option<StoredSourceState>> for SourceStateResponse {
    fn from(stored: Option<StoredSourceState>) -> Self {
        match stored {
            Some(stored) => Self {
                state: stored.state,
                updated_at: Some(stored.updated_at),
            },
            None => Self {
                state: SourceState::default(),
                updated_at: None,
            },
        }
    }
}

// ============================================================================
// Platform DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PlatformResponse {
    pub platform: Platform,
    pub is_vertical: bool,
    pub default_ingest_url: Option<&'static str>,
}

pub fn platform_catalogue() -> Vec<PlatformResponse> {
    Platform::iter()
        .map(|platform| PlatformResponse {
            platform,
            is_vertical: platform.is_vertical(),
            default_ingest_url: platform.default_ingest_url(),
        })
        .collect()
}

// ============================================================================
// Validation helpers
// ============================================================================

fn required_text(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    let raw = required_text("platform", raw)?;
    Platform::from_str(&raw)
        .map_err(|_| ApiError::validation(format!("Unknown platform '{raw}'")))
}

fn parse_vertical_mode(raw: &str) -> Result<VerticalMode, ApiError> {
    VerticalMode::from_str(raw.trim()).map_err(|_| {
        ApiError::validation(format!(
            "Invalid vertical_mode '{}', expected crop or letterbox",
            raw.trim()
        ))
    })
}

fn parse_source_state(raw: &str) -> Result<SourceState, ApiError> {
    SourceState::parse(raw)
        .ok_or_else(|| ApiError::validation(format!("Unknown source state '{}'", raw)))
}

/// Ingest endpoints must be RTMP(S) URLs with a host.
pub fn validate_ingest_url(raw: &str) -> Result<(), ApiError> {
    let url = url::Url::parse(raw)
        .map_err(|e| ApiError::validation(format!("Invalid ingest_url: {e}")))?;
    if !matches!(url.scheme(), "rtmp" | "rtmps") {
        return Err(ApiError::validation(format!(
            "ingest_url must use rtmp or rtmps, got {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ApiError::validation("ingest_url has no host"));
    }
    Ok(())
}
