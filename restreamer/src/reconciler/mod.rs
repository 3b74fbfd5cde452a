//! Reconciler.
//!
//! Converges stored destination state onto the observed upstream source state.
//! Both the fixed-interval poll and push notifications enter through
//! [`Reconciler::observe_source_state`].

mod outcome;
mod scheduler;
mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use outcome::{BatchOutcome, DestinationFailure, DestinationSummary};
pub use scheduler::PollScheduler;
pub use service::{Reconciler, ReconcilerConfig};
