//! Application-wide error types.

use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::source::ProbeError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Destination {id} is disabled")]
    DestinationDisabled { id: String },

    #[error("Source probe failed: {0}")]
    SourceProbe(#[from] ProbeError),

    #[error("Pipeline provisioning failed: {0}")]
    Provision(#[source] PipelineError),

    #[error("Channel start failed: {0}")]
    Start(#[source] PipelineError),

    #[error("Channel stop failed: {0}")]
    Stop(#[source] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Short tag used in batch failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceProbe(_) => "source_probe",
            Self::Provision(_) => "provision",
            Self::Start(_) => "start",
            Self::Stop(_) => "stop",
            Self::DestinationDisabled { .. } => "disabled",
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation",
            Self::InvalidStateTransition { .. } => "invalid_transition",
            Self::DatabaseSqlx(_) | Self::Database(_) | Self::Migration(_) => "database",
            _ => "internal",
        }
    }
}
