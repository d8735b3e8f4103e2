//! Producer and consumer sessions, and the retained state the consumer
//! advances on every new sample.

pub mod consumer;
pub mod producer;
pub mod state;

pub use consumer::{ReceiverReport, ReceiverSession, DEFAULT_POLL_INTERVAL};
pub use producer::{SenderReport, SenderSession};
pub use state::{step, Observation, SyncState, TickOutcome};

use serde::Serialize;

/// Session lifecycle. Reset is a transition back to a blank `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Active,
}

impl Phase {
    pub fn from_active(active: bool) -> Self {
        if active {
            Phase::Active
        } else {
            Phase::Idle
        }
    }

    pub fn is_active(self) -> bool {
        self == Phase::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Active).unwrap(), "\"active\"");
        assert_eq!(Phase::from_active(false), Phase::Idle);
        assert!(Phase::from_active(true).is_active());
    }
}
