//! Service container for dependency injection.
//!
//! Builds the repositories, the HTTP clients for the source and the encoding
//! service, and the reconciler that ties them together.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::database::repositories::{
    DestinationRepository, SourceStateRepository, SqlxDestinationRepository,
    SqlxSourceStateRepository,
};
use crate::pipeline::{HttpPipelineProvisioner, HttpPipelineProvisionerConfig, PipelineProvisioner};
use crate::reconciler::{PollScheduler, Reconciler, ReconcilerConfig};
use crate::source::{HttpSourceProber, HttpSourceProberConfig, SourceProber};
use crate::{Error, Result};

/// Owns the long-lived services of the process.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub destinations: Arc<dyn DestinationRepository>,
    pub source_states: Arc<dyn SourceStateRepository>,
    pub reconciler: Arc<Reconciler>,
    config: AppConfig,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Wire the production services from the pool and the configuration.
    pub fn new(pool: SqlitePool, config: AppConfig) -> Result<Self> {
        info!("Initializing service container");

        let prober: Arc<dyn SourceProber> = Arc::new(
            HttpSourceProber::new(
                HttpSourceProberConfig::new(&config.source_status_url)
                    .with_timeout(config.call_timeout),
            )
            .map_err(|e| Error::config(format!("source prober: {e}")))?,
        );

        let provisioner: Arc<dyn PipelineProvisioner> = Arc::new(
            HttpPipelineProvisioner::new(
                HttpPipelineProvisionerConfig::new(
                    &config.encoder_api_url,
                    &config.project_name,
                    &config.source_playback_url,
                )
                .with_bearer_token(config.encoder_api_token.clone())
                .with_timeout(config.call_timeout),
            )
            .map_err(|e| Error::config(format!("pipeline provisioner: {e}")))?,
        );

        Ok(Self::with_collaborators(pool, config, prober, provisioner))
    }

    /// Wire the services around caller-provided external collaborators.
    pub fn with_collaborators(
        pool: SqlitePool,
        config: AppConfig,
        prober: Arc<dyn SourceProber>,
        provisioner: Arc<dyn PipelineProvisioner>,
    ) -> Self {
        let destinations: Arc<dyn DestinationRepository> =
            Arc::new(SqlxDestinationRepository::new(pool.clone()));
        let source_states: Arc<dyn SourceStateRepository> =
            Arc::new(SqlxSourceStateRepository::new(pool.clone()));

        let reconciler = Arc::new(Reconciler::with_config(
            destinations.clone(),
            source_states.clone(),
            prober,
            provisioner,
            ReconcilerConfig {
                call_timeout: config.call_timeout,
                max_concurrent_actions: config.max_concurrent_actions,
            },
        ));

        Self {
            pool,
            destinations,
            source_states,
            reconciler,
            config,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start the background poll loop.
    pub fn start_polling(&self) -> JoinHandle<()> {
        PollScheduler::new(
            self.reconciler.clone(),
            self.config.poll_interval,
            self.cancellation_token.child_token(),
        )
        .spawn()
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Signal every background task to stop.
    pub fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool, run_migrations};
    use std::collections::HashMap;

    fn test_config() -> AppConfig {
        let vars = HashMap::from([
            ("SOURCE_STATUS_URL", "http://127.0.0.1:9/status"),
            ("SOURCE_PLAYBACK_URL", "rtmp://127.0.0.1/live/main"),
            ("ENCODER_API_URL", "http://127.0.0.1:9/api"),
            ("POLL_INTERVAL_SECS", "3600"),
        ]);
        AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_container_wiring_and_shutdown() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let container = ServiceContainer::new(pool, test_config()).unwrap();
        assert!(container.destinations.list_destinations().await.unwrap().is_empty());
        assert!(container.source_states.get_source_state().await.unwrap().is_none());
        assert_eq!(container.reconciler.config().max_concurrent_actions, 4);

        let handle = container.start_polling();
        container.shutdown();
        assert!(container.is_shutting_down());
        handle.await.unwrap();
    }
}
