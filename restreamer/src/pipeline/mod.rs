//! Pipeline provisioner.
//!
//! A pipeline is the pair of external encoding resources serving one destination:
//! an input pulling from the upstream playback URL and a channel pushing to the
//! destination's ingest endpoint. The reconciler only sees this interface.

mod error;
mod http;
pub mod profile;

pub use error::PipelineError;
pub use http::{HttpPipelineProvisioner, HttpPipelineProvisionerConfig};
pub use profile::EncodingProfile;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{ChannelState, Destination};

/// Identifiers of a freshly created pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRefs {
    pub channel_ref: String,
    pub input_ref: String,
}

/// Creates, drives and tears down the external encoding resources.
#[async_trait]
pub trait PipelineProvisioner: Send + Sync {
    /// Create an input and a channel for the destination.
    ///
    /// Either both resources exist afterwards or neither does.
    async fn create_pipeline(&self, destination: &Destination)
    -> Result<PipelineRefs, PipelineError>;

    async fn describe_channel(&self, channel_ref: &str) -> Result<ChannelState, PipelineError>;

    /// Start the channel. Already running is success.
    async fn start_channel(&self, channel_ref: &str) -> Result<(), PipelineError>;

    /// Stop the channel. Already stopped is success.
    async fn stop_channel(&self, channel_ref: &str) -> Result<(), PipelineError>;

    async fn delete_channel(&self, channel_ref: &str) -> Result<(), PipelineError>;

    async fn delete_input(&self, input_ref: &str) -> Result<(), PipelineError>;
}

/// Deterministic channel name: `{project}-{platform}-{id prefix}`.
pub fn channel_name(project: &str, destination: &Destination) -> String {
    format!(
        "{}-{}-{}",
        project,
        destination.platform,
        destination.short_id()
    )
}

/// Input name, derived from the channel name.
pub fn input_name(project: &str, destination: &Destination) -> String {
    format!("{}-input", channel_name(project, destination))
}
