//! Observed state of an external encoding channel.

use serde::{Deserialize, Serialize};

/// Channel lifecycle as reported by the encoding service.
///
/// The normal cycle is `Idle -> Starting -> Running -> Stopping -> Idle`. Anything
/// else (creation failures, deleting, recovering...) is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Idle,
    Starting,
    Running,
    Stopping,
    Other(String),
}

/// What Start should do with a channel that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// Issue the start call against the existing channel.
    Start,
    /// Already starting or running; just record the destination as active.
    AlreadyRunning,
    /// Mid-transition; report a transient failure and retry on a later pass.
    Transitioning,
    /// Unrecoverable; delete and provision from scratch.
    Recreate,
}

impl ChannelState {
    /// Parse the service's state string. Unknown strings become `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDLE" => Self::Idle,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            _ => Self::Other(s.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "IDLE",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Other(s) => s,
        }
    }

    pub fn classify_for_start(&self) -> StartDecision {
        match self {
            Self::Idle => StartDecision::Start,
            Self::Starting | Self::Running => StartDecision::AlreadyRunning,
            Self::Stopping => StartDecision::Transitioning,
            Self::Other(_) => StartDecision::Recreate,
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
