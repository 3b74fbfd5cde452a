//! Destination status machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Observed runtime status of a destination.
///
/// This is distinct from `enabled`, which records operator intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationStatus {
    /// No pipeline is broadcasting.
    #[default]
    Inactive,
    /// A pipeline exists and a start has been requested but not confirmed.
    Starting,
    /// The pipeline channel is running.
    Active,
}

impl DestinationStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Starting => "starting",
            Self::Active => "active",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(Self::Inactive),
            "starting" => Some(Self::Starting),
            "active" => Some(Self::Active),
            _ => None,
        }
    }

    /// Whether a pipeline channel must be attached in this status.
    pub fn requires_pipeline(&self) -> bool {
        !matches!(self, Self::Inactive)
    }

    /// Validate a status transition.
    pub fn can_transition_to(&self, target: DestinationStatus) -> bool {
        use DestinationStatus::*;

        match (self, target) {
            (from, to) if from == &to => true,

            (Inactive, Starting) => true,

            // Start confirmed, or a stop issued while still starting
            (Starting, Active | Inactive) => true,

            (Active, Inactive) => true,

            // Pipeline vanished underneath an active destination and is re-provisioned
            (Active, Starting) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new status.
    pub fn transition_to(&self, target: DestinationStatus) -> Result<DestinationStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for DestinationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            DestinationStatus::Inactive,
            DestinationStatus::Starting,
            DestinationStatus::Active,
        ] {
            assert_eq!(DestinationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DestinationStatus::parse("ACTIVE"), None);
    }

    #[test]
    fn test_valid_transitions() {
        let status = DestinationStatus::Inactive;
        assert!(status.can_transition_to(DestinationStatus::Starting));
        assert!(DestinationStatus::Starting.can_transition_to(DestinationStatus::Active));
        assert!(DestinationStatus::Starting.can_transition_to(DestinationStatus::Inactive));
        assert!(DestinationStatus::Active.can_transition_to(DestinationStatus::Inactive));
        assert!(DestinationStatus::Active.can_transition_to(DestinationStatus::Active));
    }

    #[test]
    fn test_inactive_cannot_jump_to_active() {
        let result = DestinationStatus::Inactive.transition_to(DestinationStatus::Active);
        match result {
            Err(Error::InvalidStateTransition { from, to }) => {
                assert_eq!(from, "inactive");
                assert_eq!(to, "active");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_requires_pipeline() {
        assert!(!DestinationStatus::Inactive.requires_pipeline());
        assert!(DestinationStatus::Starting.requires_pipeline());
        assert!(DestinationStatus::Active.requires_pipeline());
    }
}
