//! Result of one reconciliation pass.

use serde::Serialize;

use crate::Error;
use crate::domain::Destination;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSummary {
    pub id: String,
    pub name: String,
}

impl From<&Destination> for DestinationSummary {
    fn from(dest: &Destination) -> Self {
        Self {
            id: dest.id.clone(),
            name: dest.name.clone(),
        }
    }
}

/// A per-destination failure captured instead of aborting the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationFailure {
    pub destination_id: String,
    pub name: String,
    /// provision | start | stop | ...
    pub kind: String,
    pub message: String,
}

impl DestinationFailure {
    pub fn new(dest: &Destination, error: &Error) -> Self {
        Self {
            destination_id: dest.id.clone(),
            name: dest.name.clone(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Partial-success report of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub started: Vec<DestinationSummary>,
    pub stopped: Vec<DestinationSummary>,
    pub errors: Vec<DestinationFailure>,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.errors.is_empty()
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.started.extend(other.started);
        self.stopped.extend(other.stopped);
        self.errors.extend(other.errors);
    }

    pub fn started_ids(&self) -> Vec<&str> {
        self.started.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn stopped_ids(&self) -> Vec<&str> {
        self.stopped.iter().map(|d| d.id.as_str()).collect()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "started={} stopped={} errors={}",
            self.started.len(),
            self.stopped.len(),
            self.errors.len()
        )
    }
}
