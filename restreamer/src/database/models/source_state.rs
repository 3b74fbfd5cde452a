//! Persisted source-state marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;
use crate::domain::SourceState;

/// Singleton row of the `source_state` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SourceStateDbModel {
    /// LIVE | OFFLINE
    pub state: String,
    /// Unix epoch milliseconds (UTC) of the last write.
    pub updated_at: i64,
}

/// Last observed source state and when it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoredSourceState {
    pub state: SourceState,
    pub updated_at: DateTime<Utc>,
}

impl SourceStateDbModel {
    /// Unrecognised values read back as OFFLINE, the safe default for edge detection.
    pub fn into_stored(self) -> StoredSourceState {
        StoredSourceState {
            state: SourceState::parse(&self.state).unwrap_or_default(),
            updated_at: ms_to_datetime(self.updated_at),
        }
    }
}
