//! Upstream live source state.

use serde::{Deserialize, Serialize};

/// Whether the upstream source is broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceState {
    Live,
    #[default]
    Offline,
}

impl SourceState {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Offline => "OFFLINE",
        }
    }

    /// Parse a state string from storage or from a push notification.
    ///
    /// Accepts the plain state names as well as the upstream event names
    /// (`StreamStarted`, `Stream Start`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();

        match normalized.as_str() {
            "LIVE" | "STREAMSTARTED" | "STREAMSTART" | "ONLINE" => Some(Self::Live),
            "OFFLINE" | "STREAMENDED" | "STREAMEND" => Some(Self::Offline),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
