//! REST client for the encoding service.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    PipelineError, PipelineProvisioner, PipelineRefs, channel_name, input_name, profile,
};
use crate::domain::{ChannelState, Destination};

/// Configuration for [`HttpPipelineProvisioner`].
#[derive(Debug, Clone)]
pub struct HttpPipelineProvisionerConfig {
    /// Base URL of the encoding service API.
    pub base_url: String,
    pub bearer_token: Option<String>,
    /// Prefix for resource names.
    pub project_name: String,
    /// Upstream playback URL every input pulls from.
    pub source_playback_url: String,
    pub timeout: Duration,
}

impl HttpPipelineProvisionerConfig {
    pub fn new(
        base_url: impl Into<String>,
        project_name: impl Into<String>,
        source_playback_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            project_name: project_name.into(),
            source_playback_url: source_playback_url.into(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelDescription {
    state: String,
}

/// Provisioner talking to a REST encoding service.
pub struct HttpPipelineProvisioner {
    config: HttpPipelineProvisionerConfig,
    client: Client,
}

impl HttpPipelineProvisioner {
    pub fn new(config: HttpPipelineProvisionerConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and map error statuses. `404` becomes `NotFound(resource)`.
    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, PipelineError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(resource.to_string()));
        }

        let message = response.text().await.unwrap_or_default();
        Err(PipelineError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn create_input(&self, destination: &Destination) -> Result<String, PipelineError> {
        let body = json!({
            "name": input_name(&self.config.project_name, destination),
            "type": "URL_PULL",
            "sources": [{ "url": self.config.source_playback_url }],
        });
        let response = self
            .send(self.client.post(self.url("/inputs")).json(&body), "input")
            .await?;
        let created: CreatedResource = response
            .json()
            .await
            .map_err(|e| PipelineError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }

    async fn create_channel(
        &self,
        destination: &Destination,
        input_ref: &str,
    ) -> Result<String, PipelineError> {
        let encoder = profile::select(destination.platform.is_vertical(), destination.vertical_mode);
        let body = json!({
            "name": channel_name(&self.config.project_name, destination),
            "input_id": input_ref,
            "channel_class": "SINGLE_PIPELINE",
            "input_specification": {
                "codec": "AVC",
                "resolution": "HD",
                "maximum_bitrate": "MAX_10_MBPS",
            },
            "destination": {
                "url": destination.ingest_url,
                "stream_key": destination.stream_key.expose(),
            },
            "encoder": encoder,
            "tags": {
                "destination_id": destination.id,
                "platform": destination.platform.to_string(),
            },
        });
        let response = self
            .send(self.client.post(self.url("/channels")).json(&body), "channel")
            .await?;
        let created: CreatedResource = response
            .json()
            .await
            .map_err(|e| PipelineError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }

    /// Start/stop share the same shape; `409` means already in the target state.
    async fn channel_action(&self, channel_ref: &str, action: &str) -> Result<(), PipelineError> {
        let request = self
            .client
            .post(self.url(&format!("/channels/{channel_ref}/{action}")));
        match self.send(request, channel_ref).await {
            Ok(_) => Ok(()),
            Err(PipelineError::Rejected { status: 409, message }) => {
                debug!(
                    channel = %channel_ref,
                    action,
                    "Channel already in requested state: {}",
                    message
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PipelineProvisioner for HttpPipelineProvisioner {
    async fn create_pipeline(
        &self,
        destination: &Destination,
    ) -> Result<PipelineRefs, PipelineError> {
        let input_ref = self.create_input(destination).await?;

        let channel_ref = match self.create_channel(destination, &input_ref).await {
            Ok(channel_ref) => channel_ref,
            Err(e) => {
                // Do not leave a lone input behind.
                if let Err(cleanup) = self.delete_input(&input_ref).await
                    && !cleanup.is_not_found()
                {
                    warn!(
                        input = %input_ref,
                        error = %cleanup,
                        "Failed to clean up input after channel creation failure"
                    );
                }
                return Err(e);
            }
        };

        info!(
            destination_id = %destination.id,
            channel = %channel_ref,
            input = %input_ref,
            "Created pipeline"
        );

        Ok(PipelineRefs {
            channel_ref,
            input_ref,
        })
    }

    async fn describe_channel(&self, channel_ref: &str) -> Result<ChannelState, PipelineError> {
        let request = self
            .client
            .get(self.url(&format!("/channels/{channel_ref}")));
        let response = self.send(request, channel_ref).await?;
        let description: ChannelDescription = response
            .json()
            .await
            .map_err(|e| PipelineError::InvalidResponse(e.to_string()))?;
        Ok(ChannelState::parse(&description.state))
    }

    async fn start_channel(&self, channel_ref: &str) -> Result<(), PipelineError> {
        self.channel_action(channel_ref, "start").await
    }

    async fn stop_channel(&self, channel_ref: &str) -> Result<(), PipelineError> {
        self.channel_action(channel_ref, "stop").await
    }

    async fn delete_channel(&self, channel_ref: &str) -> Result<(), PipelineError> {
        let request = self
            .client
            .delete(self.url(&format!("/channels/{channel_ref}")));
        self.send(request, channel_ref).await?;
        Ok(())
    }

    async fn delete_input(&self, input_ref: &str) -> Result<(), PipelineError> {
        let request = self.client.delete(self.url(&format!("/inputs/{input_ref}")));
        self.send(request, input_ref).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Platform, StreamKey, VerticalMode};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provisioner(server: &MockServer) -> HttpPipelineProvisioner {
        let config = HttpPipelineProvisionerConfig::new(
            server.uri(),
            "acme",
            "https://playback.example.com/live.m3u8",
        )
        .with_bearer_token(Some("secret-token".into()))
        .with_timeout(Duration::from_millis(500));
        HttpPipelineProvisioner::new(config).unwrap()
    }

    fn destination() -> Destination {
        let mut dest = Destination::new(
            Platform::Instagram,
            "Reels",
            "rtmps://live-upload.instagram.com:443/rtmp/",
            StreamKey::new("ig-key"),
        )
        .with_vertical_mode(VerticalMode::Letterbox);
        dest.id = "abcdef0123456789".into();
        dest
    }

    #[tokio::test]
    async fn test_create_pipeline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inputs"))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_partial_json(serde_json::json!({
                "name": "acme-instagram-abcdef01-input",
                "type": "URL_PULL",
                "sources": [{ "url": "https://playback.example.com/live.m3u8" }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "in-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels"))
            .and(body_partial_json(serde_json::json!({
                "name": "acme-instagram-abcdef01",
                "input_id": "in-1",
                "destination": { "stream_key": "ig-key" },
                "encoder": { "video": { "width": 1080, "height": 1920, "scaling": "STRETCH_TO_OUTPUT" } }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "ch-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let refs = provisioner(&server)
            .create_pipeline(&destination())
            .await
            .unwrap();
        assert_eq!(refs.channel_ref, "ch-1");
        assert_eq!(refs.input_ref, "in-1");
    }

    #[tokio::test]
    async fn test_channel_failure_cleans_up_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inputs"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "in-9"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/inputs/in-9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let result = provisioner(&server).create_pipeline(&destination()).await;
        match result {
            Err(PipelineError::Rejected { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_describe_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/ch-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "RUNNING"})),
            )
            .mount(&server)
            .await;

        let provisioner = provisioner(&server);
        assert_eq!(
            provisioner.describe_channel("ch-1").await.unwrap(),
            ChannelState::Running
        );
        assert!(
            provisioner
                .describe_channel("ch-missing")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_start_and_stop_tolerate_desired_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/ch-1/start"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already running"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/ch-1/stop"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let provisioner = provisioner(&server);
        provisioner.start_channel("ch-1").await.unwrap();
        provisioner.stop_channel("ch-1").await.unwrap();
        assert!(
            provisioner
                .stop_channel("ch-gone")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_start_server_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/ch-1/start"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(matches!(
            provisioner(&server).start_channel("ch-1").await,
            Err(PipelineError::Rejected { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_resources() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/channels/ch-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/inputs/in-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provisioner = provisioner(&server);
        provisioner.delete_channel("ch-1").await.unwrap();
        assert!(
            provisioner
                .delete_input("in-1")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }
}
