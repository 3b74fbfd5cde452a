//! Destination database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{Destination, DestinationStatus, Platform, StreamKey, VerticalMode};
use crate::{Error, Result};

/// Row of the `destinations` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DestinationDbModel {
    pub id: String,
    /// Lowercase platform tag (youtube, tiktok, ...)
    pub platform: String,
    pub name: String,
    pub ingest_url: String,
    pub stream_key: String,
    pub enabled: bool,
    /// crop | letterbox
    pub vertical_mode: String,
    /// inactive | starting | active
    pub status: String,
    pub pipeline_channel_ref: Option<String>,
    pub pipeline_input_ref: Option<String>,
    pub start_retry: bool,
    pub pipeline_stale: bool,
    /// Unix epoch milliseconds (UTC) when created.
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC) when last updated.
    pub updated_at: i64,
}

impl From<&Destination> for DestinationDbModel {
    fn from(dest: &Destination) -> Self {
        Self {
            id: dest.id.clone(),
            platform: dest.platform.to_string(),
            name: dest.name.clone(),
            ingest_url: dest.ingest_url.clone(),
            stream_key: dest.stream_key.expose().to_string(),
            enabled: dest.enabled,
            vertical_mode: dest.vertical_mode.to_string(),
            status: dest.status.as_str().to_string(),
            pipeline_channel_ref: dest.pipeline_channel_ref.clone(),
            pipeline_input_ref: dest.pipeline_input_ref.clone(),
            start_retry: dest.start_retry,
            pipeline_stale: dest.pipeline_stale,
            created_at: datetime_to_ms(dest.created_at),
            updated_at: datetime_to_ms(dest.updated_at),
        }
    }
}

impl TryFrom<DestinationDbModel> for Destination {
    type Error = Error;

    fn try_from(row: DestinationDbModel) -> Result<Self> {
        let platform = Platform::from_str(&row.platform).map_err(|_| {
            Error::Database(format!(
                "destination {} has unknown platform '{}'",
                row.id, row.platform
            ))
        })?;
        let vertical_mode = VerticalMode::from_str(&row.vertical_mode).map_err(|_| {
            Error::Database(format!(
                "destination {} has unknown vertical mode '{}'",
                row.id, row.vertical_mode
            ))
        })?;
        let status = DestinationStatus::parse(&row.status).ok_or_else(|| {
            Error::Database(format!(
                "destination {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;

        Ok(Destination {
            id: row.id,
            platform,
            name: row.name,
            ingest_url: row.ingest_url,
            stream_key: StreamKey::new(row.stream_key),
            enabled: row.enabled,
            vertical_mode,
            status,
            pipeline_channel_ref: row.pipeline_channel_ref,
            pipeline_input_ref: row.pipeline_input_ref,
            start_retry: row.start_retry,
            pipeline_stale: row.pipeline_stale,
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
        })
    }
}
