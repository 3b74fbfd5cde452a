//! HTTP status-endpoint prober.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ProbeError, SourceProber, SourceSnapshot};
use crate::domain::SourceState;

/// Configuration for [`HttpSourceProber`].
#[derive(Debug, Clone)]
pub struct HttpSourceProberConfig {
    /// Endpoint returning the current stream status as JSON.
    pub status_url: String,
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

impl HttpSourceProberConfig {
    pub fn new(status_url: impl Into<String>) -> Self {
        Self {
            status_url: status_url.into(),
            bearer_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    state: String,
    #[serde(default)]
    viewer_count: Option<u64>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    health: Option<String>,
}

/// Prober backed by a JSON status endpoint.
///
/// `200 {"state": "LIVE"}` is live, `404` means no active session.
pub struct HttpSourceProber {
    config: HttpSourceProberConfig,
    client: Client,
}

impl HttpSourceProber {
    pub fn new(config: HttpSourceProberConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProbeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SourceProber for HttpSourceProber {
    async fn probe(&self) -> Result<SourceSnapshot, ProbeError> {
        let mut request = self.client.get(&self.config.status_url);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Source status endpoint reports no active session");
            return Ok(SourceSnapshot::offline());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let payload: StatusPayload = response
            .json()
            .await
            .map_err(|e| ProbeError::InvalidPayload(e.to_string()))?;
        let state = SourceState::parse(&payload.state).ok_or_else(|| {
            ProbeError::InvalidPayload(format!("unknown state '{}'", payload.state))
        })?;

        Ok(SourceSnapshot {
            state,
            viewer_count: payload.viewer_count,
            started_at: payload.started_at,
            health: payload.health,
        })
    }
}
