//! Reconciler service implementation.
//!
//! The reconciler is edge-triggered: it compares the freshly observed source state
//! with the last persisted one and only acts when they differ. Start and Stop are
//! idempotent and resumable, so overlapping passes converge instead of needing locks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::outcome::{BatchOutcome, DestinationFailure, DestinationSummary};
use crate::database::models::StoredSourceState;
use crate::database::repositories::{DestinationRepository, SourceStateRepository};
use crate::domain::{
    Destination, DestinationStatus, DestinationUpdate, SourceState, StartDecision,
};
use crate::pipeline::{PipelineError, PipelineProvisioner};
use crate::source::{ProbeError, SourceProber, SourceSnapshot};
use crate::{Error, Result};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on every external call (probe, provision, describe, start, stop, delete).
    pub call_timeout: Duration,
    /// How many destinations are driven at once within one pass.
    pub max_concurrent_actions: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(20),
            max_concurrent_actions: 4,
        }
    }
}

/// The reconciliation service.
pub struct Reconciler {
    destinations: Arc<dyn DestinationRepository>,
    source_states: Arc<dyn SourceStateRepository>,
    prober: Arc<dyn SourceProber>,
    provisioner: Arc<dyn PipelineProvisioner>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        destinations: Arc<dyn DestinationRepository>,
        source_states: Arc<dyn SourceStateRepository>,
        prober: Arc<dyn SourceProber>,
        provisioner: Arc<dyn PipelineProvisioner>,
    ) -> Self {
        Self::with_config(
            destinations,
            source_states,
            prober,
            provisioner,
            ReconcilerConfig::default(),
        )
    }

    /// Create a new reconciler with custom configuration.
    pub fn with_config(
        destinations: Arc<dyn DestinationRepository>,
        source_states: Arc<dyn SourceStateRepository>,
        prober: Arc<dyn SourceProber>,
        provisioner: Arc<dyn PipelineProvisioner>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            destinations,
            source_states,
            prober,
            provisioner,
            config: ReconcilerConfig {
                max_concurrent_actions: config.max_concurrent_actions.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    // ========== Source state entry points ==========

    /// Act on a change of the source state.
    ///
    /// LIVE edge: start every enabled, non-active destination.
    /// OFFLINE edge: stop every active destination.
    /// Same state: nothing.
    pub async fn reconcile_source_state_change(
        &self,
        previous: SourceState,
        current: SourceState,
    ) -> Result<BatchOutcome> {
        if previous == current {
            debug!("Source state unchanged ({}), nothing to reconcile", current);
            return Ok(BatchOutcome::default());
        }

        info!("Source went {} (was {})", current, previous);

        let outcome = match current {
            SourceState::Live => {
                let targets = self.destinations.list_startable().await?;
                debug!("{} destination(s) to start", targets.len());
                self.start_batch(targets).await
            }
            SourceState::Offline => {
                let targets = self
                    .destinations
                    .list_by_status(DestinationStatus::Active)
                    .await?;
                debug!("{} destination(s) to stop", targets.len());
                self.stop_batch(targets).await
            }
        };

        Self::log_outcome(&outcome);
        Ok(outcome)
    }

    /// Record an observed source state and reconcile the edge against the last
    /// persisted one (OFFLINE when nothing was recorded yet).
    pub async fn observe_source_state(&self, current: SourceState) -> Result<BatchOutcome> {
        let (_, outcome) = self.observe(current).await?;
        Ok(outcome)
    }

    /// Push-notification path.
    ///
    /// The sender's idea of the previous state is informational only; edges are
    /// always computed against the persisted marker so duplicates are no-ops.
    pub async fn handle_notification(
        &self,
        current: SourceState,
        previous_hint: Option<SourceState>,
    ) -> Result<BatchOutcome> {
        debug!(
            "Source notification: {} (sender previous: {})",
            current,
            previous_hint.map(|s| s.as_str()).unwrap_or("-")
        );
        self.observe_source_state(current).await
    }

    /// Poll path: probe the source, reconcile any edge, and re-drive destinations
    /// an earlier pass left half done or failed to start.
    ///
    /// A probe failure aborts the cycle before any destination is touched.
    pub async fn poll_once(&self) -> Result<BatchOutcome> {
        let current = self.probe().await?.state;
        let (edge, mut outcome) = self.observe(current).await?;
        if !edge {
            outcome.merge(self.converge_pending(current).await?);
        }
        Ok(outcome)
    }

    /// Probe the source with the configured timeout.
    pub async fn probe(&self) -> Result<SourceSnapshot> {
        match timeout(self.config.call_timeout, self.prober.probe()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProbeError::Timeout.into()),
        }
    }

    /// Last persisted source state.
    pub async fn stored_source_state(&self) -> Result<Option<StoredSourceState>> {
        self.source_states.get_source_state().await
    }

    async fn observe(&self, current: SourceState) -> Result<(bool, BatchOutcome)> {
        let previous = self
            .source_states
            .get_source_state()
            .await?
            .map(|stored| stored.state)
            .unwrap_or_default();

        if previous == current {
            return Ok((false, BatchOutcome::default()));
        }

        // Persist first so a concurrent observer of the same state sees no edge.
        self.source_states.put_source_state(current).await?;
        let outcome = self.reconcile_source_state_change(previous, current).await?;
        Ok((true, outcome))
    }

    /// Without an edge, finish what earlier passes left undone.
    ///
    /// LIVE retries enabled destinations left `starting` or whose last start
    /// failed. OFFLINE stops whatever is still `starting`.
    async fn converge_pending(&self, current: SourceState) -> Result<BatchOutcome> {
        let pending = match current {
            SourceState::Live => self.destinations.list_retryable().await?,
            SourceState::Offline => {
                self.destinations
                    .list_by_status(DestinationStatus::Starting)
                    .await?
            }
        };
        if pending.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let outcome = match current {
            SourceState::Live => {
                debug!("Retrying start of {} destination(s)", pending.len());
                self.start_batch(pending).await
            }
            SourceState::Offline => {
                debug!("Stopping {} destination(s) stuck in starting", pending.len());
                self.stop_batch(pending).await
            }
        };

        Self::log_outcome(&outcome);
        Ok(outcome)
    }

    // ========== Manual triggers ==========

    /// Apply an operator edit.
    ///
    /// When the edit reshapes the pipeline of an inactive destination, the idle
    /// resources are released right away so the next start provisions afresh. A
    /// running or starting pipeline stays marked stale and is rebuilt by the next start.
    pub async fn update_destination(
        &self,
        id: &str,
        update: &DestinationUpdate,
    ) -> Result<Destination> {
        let dest = self.destinations.update_settings(id, update).await?;
        if !dest.pipeline_stale || dest.status != DestinationStatus::Inactive {
            return Ok(dest);
        }
        let Some(channel_ref) = dest.pipeline_channel_ref.as_deref() else {
            return Ok(dest);
        };

        if !self
            .discard_pipeline(Some(channel_ref), dest.pipeline_input_ref.as_deref())
            .await
        {
            // Still marked stale; the next start retries the teardown.
            return Ok(dest);
        }
        if self.destinations.detach_pipeline(id, channel_ref).await? {
            info!(
                destination_id = %id,
                "Released pipeline {} after an ingest settings change",
                channel_ref
            );
        }
        self.destinations.get_destination(id).await
    }

    /// Start one destination regardless of the source state.
    pub async fn start_destination(&self, id: &str) -> Result<Destination> {
        let destination = self.destinations.get_destination(id).await?;
        if !destination.enabled {
            return Err(Error::DestinationDisabled { id: id.to_string() });
        }

        self.start(&destination).await?;
        self.destinations.get_destination(id).await
    }

    /// Stop one destination regardless of the source state.
    pub async fn stop_destination(&self, id: &str) -> Result<Destination> {
        let destination = self.destinations.get_destination(id).await?;
        self.stop(&destination).await?;
        self.destinations.get_destination(id).await
    }

    /// Tear down the pipeline and remove the record.
    ///
    /// Teardown is best effort: failures come back as warnings and never keep the
    /// record alive. Missing resources are not warnings.
    pub async fn delete_destination(&self, id: &str) -> Result<Vec<String>> {
        let destination = self.destinations.get_destination(id).await?;
        let mut warnings = Vec::new();

        if let Some(channel_ref) = destination.pipeline_channel_ref.as_deref() {
            if let Err(e) = self.call(self.provisioner.stop_channel(channel_ref)).await
                && !e.is_not_found()
            {
                warnings.push(format!("failed to stop channel {channel_ref}: {e}"));
            }
            if let Err(e) = self.call(self.provisioner.delete_channel(channel_ref)).await
                && !e.is_not_found()
            {
                warnings.push(format!("failed to delete channel {channel_ref}: {e}"));
            }
        }

        if let Some(input_ref) = destination.pipeline_input_ref.as_deref()
            && let Err(e) = self.call(self.provisioner.delete_input(input_ref)).await
            && !e.is_not_found()
        {
            warnings.push(format!("failed to delete input {input_ref}: {e}"));
        }

        for warning in &warnings {
            warn!(destination_id = %id, "Pipeline teardown: {}", warning);
        }

        self.destinations.delete_destination(id).await?;
        info!(destination_id = %id, "Deleted destination {}", destination.name);

        Ok(warnings)
    }

    // ========== Batches ==========

    async fn start_batch(&self, targets: Vec<Destination>) -> BatchOutcome {
        let results: Vec<(Destination, Result<()>)> = stream::iter(targets)
            .map(|dest| async move {
                let result = self.start(&dest).await;
                (dest, result)
            })
            .buffer_unordered(self.config.max_concurrent_actions)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (dest, result) in results {
            match result {
                Ok(()) => outcome.started.push(DestinationSummary::from(&dest)),
                Err(e) => {
                    warn!(destination_id = %dest.id, "Failed to start {}: {}", dest.name, e);
                    outcome.errors.push(DestinationFailure::new(&dest, &e));
                }
            }
        }
        outcome
    }

    async fn stop_batch(&self, targets: Vec<Destination>) -> BatchOutcome {
        let results: Vec<(Destination, Result<bool>)> = stream::iter(targets)
            .map(|dest| async move {
                let result = self.stop(&dest).await;
                (dest, result)
            })
            .buffer_unordered(self.config.max_concurrent_actions)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (dest, result) in results {
            match result {
                Ok(true) => outcome.stopped.push(DestinationSummary::from(&dest)),
                Ok(false) => {}
                Err(e) => {
                    warn!(destination_id = %dest.id, "Failed to stop {}: {}", dest.name, e);
                    outcome.errors.push(DestinationFailure::new(&dest, &e));
                }
            }
        }
        outcome
    }

    // ========== Start / Stop ==========

    /// Drive one destination to `active` and remember whether the attempt needs a retry.
    async fn start(&self, dest: &Destination) -> Result<()> {
        let result = self.drive_start(dest).await;
        let retry = result.is_err();
        if retry != dest.start_retry
            && let Err(e) = self.destinations.set_start_retry(&dest.id, retry).await
        {
            warn!(destination_id = %dest.id, "Failed to record start outcome: {}", e);
        }
        result
    }

    /// An existing channel is reused when it can be; a new pipeline is only
    /// provisioned when there is none, the old one is unusable, or its settings
    /// are stale.
    async fn drive_start(&self, dest: &Destination) -> Result<()> {
        if let Some(channel_ref) = dest.pipeline_channel_ref.as_deref()
            && dest.pipeline_stale
        {
            info!(
                destination_id = %dest.id,
                "Settings changed since channel {} was provisioned, rebuilding pipeline",
                channel_ref
            );
            if dest.status != DestinationStatus::Inactive
                && let Err(e) = self.call(self.provisioner.stop_channel(channel_ref)).await
                && !e.is_not_found()
            {
                warn!(destination_id = %dest.id, "Failed to stop channel {}: {}", channel_ref, e);
            }
            self.discard_pipeline(Some(channel_ref), dest.pipeline_input_ref.as_deref())
                .await;
        } else if let Some(channel_ref) = dest.pipeline_channel_ref.as_deref() {
            match self.call(self.provisioner.describe_channel(channel_ref)).await {
                Ok(state) => match state.classify_for_start() {
                    StartDecision::AlreadyRunning => {
                        debug!(
                            destination_id = %dest.id,
                            "Channel {} already {}, marking active",
                            channel_ref,
                            state
                        );
                        self.advance_to_active(dest).await?;
                        info!(destination_id = %dest.id, "Destination {} is active", dest.name);
                        return Ok(());
                    }
                    StartDecision::Start => {
                        if dest.status != DestinationStatus::Starting {
                            self.destinations
                                .transition_status(
                                    &dest.id,
                                    dest.status,
                                    DestinationStatus::Starting,
                                )
                                .await?;
                        }
                        return self.issue_start(dest, channel_ref).await;
                    }
                    StartDecision::Transitioning => {
                        self.hold_starting(dest).await?;
                        return Err(Error::Start(PipelineError::Transitioning {
                            resource: channel_ref.to_string(),
                            state: state.to_string(),
                        }));
                    }
                    StartDecision::Recreate => {
                        warn!(
                            destination_id = %dest.id,
                            "Channel {} is in unexpected state {}, recreating pipeline",
                            channel_ref,
                            state
                        );
                        self.discard_pipeline(
                            Some(channel_ref),
                            dest.pipeline_input_ref.as_deref(),
                        )
                        .await;
                    }
                },
                Err(e) if e.is_not_found() => {
                    info!(
                        destination_id = %dest.id,
                        "Channel {} no longer exists, provisioning a new pipeline",
                        channel_ref
                    );
                }
                Err(e) => {
                    self.hold_starting(dest).await?;
                    return Err(Error::Start(e));
                }
            }
        }

        let refs = self
            .call(self.provisioner.create_pipeline(dest))
            .await
            .map_err(Error::Provision)?;

        let attached = self
            .destinations
            .attach_pipeline(
                &dest.id,
                dest.pipeline_channel_ref.as_deref(),
                &refs.channel_ref,
                &refs.input_ref,
            )
            .await;

        match attached {
            Ok(true) => {}
            Ok(false) => {
                self.discard_pipeline(Some(&refs.channel_ref), Some(&refs.input_ref))
                    .await;
                return Err(Error::Provision(PipelineError::Conflict(format!(
                    "destination {} changed while provisioning",
                    dest.id
                ))));
            }
            Err(e) => {
                self.discard_pipeline(Some(&refs.channel_ref), Some(&refs.input_ref))
                    .await;
                return Err(e);
            }
        }

        self.issue_start(dest, &refs.channel_ref).await
    }

    /// Issue the start call. The destination must already be `starting`.
    async fn issue_start(&self, dest: &Destination, channel_ref: &str) -> Result<()> {
        self.call(self.provisioner.start_channel(channel_ref))
            .await
            .map_err(Error::Start)?;

        let advanced = self
            .destinations
            .transition_status(
                &dest.id,
                DestinationStatus::Starting,
                DestinationStatus::Active,
            )
            .await?;
        if !advanced {
            debug!(
                destination_id = %dest.id,
                "Status changed concurrently, leaving it to the next pass"
            );
        }

        info!(
            destination_id = %dest.id,
            "Started channel {} for {}",
            channel_ref,
            dest.name
        );
        Ok(())
    }

    /// Move an inactive destination with a channel to `starting` so the next
    /// LIVE poll resumes it on the same resources.
    async fn hold_starting(&self, dest: &Destination) -> Result<()> {
        if dest.status == DestinationStatus::Inactive {
            self.destinations
                .transition_status(
                    &dest.id,
                    DestinationStatus::Inactive,
                    DestinationStatus::Starting,
                )
                .await?;
        }
        Ok(())
    }

    async fn advance_to_active(&self, dest: &Destination) -> Result<()> {
        match dest.status {
            DestinationStatus::Active => Ok(()),
            DestinationStatus::Starting => {
                self.destinations
                    .transition_status(
                        &dest.id,
                        DestinationStatus::Starting,
                        DestinationStatus::Active,
                    )
                    .await?;
                Ok(())
            }
            DestinationStatus::Inactive => {
                self.destinations
                    .transition_status(
                        &dest.id,
                        DestinationStatus::Inactive,
                        DestinationStatus::Starting,
                    )
                    .await?;
                self.destinations
                    .transition_status(
                        &dest.id,
                        DestinationStatus::Starting,
                        DestinationStatus::Active,
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Drive one destination to `inactive`.
    ///
    /// Returns whether a stop call was issued. The stored status never stays
    /// `active` past the attempt; a genuine stop failure is still reported.
    async fn stop(&self, dest: &Destination) -> Result<bool> {
        if dest.start_retry {
            self.destinations.set_start_retry(&dest.id, false).await?;
        }

        let Some(channel_ref) = dest.pipeline_channel_ref.as_deref() else {
            debug!(destination_id = %dest.id, "No pipeline channel, nothing to stop");
            return Ok(false);
        };

        let failure = match self.call(self.provisioner.stop_channel(channel_ref)).await {
            Ok(()) => None,
            Err(e) if e.is_not_found() => {
                debug!(
                    destination_id = %dest.id,
                    "Channel {} already gone, treating as stopped",
                    channel_ref
                );
                None
            }
            Err(e) => Some(e),
        };

        self.destinations
            .set_status(&dest.id, DestinationStatus::Inactive)
            .await?;

        match failure {
            Some(e) => Err(Error::Stop(e)),
            None => {
                info!(
                    destination_id = %dest.id,
                    "Stopped channel {} for {}",
                    channel_ref,
                    dest.name
                );
                Ok(true)
            }
        }
    }

    /// Best-effort removal of pipeline resources that are no longer wanted.
    ///
    /// Returns `false` if anything is left behind.
    async fn discard_pipeline(&self, channel_ref: Option<&str>, input_ref: Option<&str>) -> bool {
        let mut clean = true;
        if let Some(channel_ref) = channel_ref
            && let Err(e) = self.call(self.provisioner.delete_channel(channel_ref)).await
            && !e.is_not_found()
        {
            warn!("Failed to delete channel {}: {}", channel_ref, e);
            clean = false;
        }
        if let Some(input_ref) = input_ref
            && let Err(e) = self.call(self.provisioner.delete_input(input_ref)).await
            && !e.is_not_found()
        {
            warn!("Failed to delete input {}: {}", input_ref, e);
            clean = false;
        }
        clean
    }

    /// Bound an external call by the configured timeout.
    async fn call<T, F>(&self, fut: F) -> std::result::Result<T, PipelineError>
    where
        F: Future<Output = std::result::Result<T, PipelineError>>,
    {
        match timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout),
        }
    }

    fn log_outcome(outcome: &BatchOutcome) {
        if outcome.errors.is_empty() {
            info!("Reconciliation pass finished: {}", outcome.summary());
        } else {
            warn!("Reconciliation pass finished with errors: {}", outcome.summary());
        }
    }
}
