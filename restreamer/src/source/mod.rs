//! Live-source prober.
//!
//! Answers one question: is the upstream source LIVE or OFFLINE right now.
//! Edge detection and history live in the reconciler.

mod error;
mod http;

pub use error::ProbeError;
pub use http::{HttpSourceProber, HttpSourceProberConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SourceState;

/// Current state plus whatever telemetry the source reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub state: SourceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl SourceSnapshot {
    pub fn offline() -> Self {
        Self {
            state: SourceState::Offline,
            viewer_count: None,
            started_at: None,
            health: None,
        }
    }
}

/// Source of truth for the upstream live state.
#[async_trait]
pub trait SourceProber: Send + Sync {
    /// Query the source. A missing session is OFFLINE, not an error.
    async fn probe(&self) -> Result<SourceSnapshot, ProbeError>;

    async fn current_state(&self) -> Result<SourceState, ProbeError> {
        Ok(self.probe().await?.state)
    }
}
