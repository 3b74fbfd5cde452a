//! Fixed-interval poll loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Reconciler;

/// Drives [`Reconciler::poll_once`] on a timer until cancelled.
pub struct PollScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl PollScheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            interval,
            cancel_token,
        }
    }

    /// Run the loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!("Source poll scheduler started (every {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Source poll scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.reconciler.poll_once().await {
                        Ok(outcome) if outcome.is_empty() => {
                            debug!("Poll cycle finished with no actions");
                        }
                        Ok(outcome) => {
                            info!("Poll cycle finished: {}", outcome.summary());
                        }
                        Err(e) => {
                            warn!("Poll cycle aborted: {}", e);
                        }
                    }
                }
            }
        }

        info!("Source poll scheduler stopped");
    }
}
