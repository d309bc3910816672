//! Experiment lifecycle state

use serde::{Deserialize, Serialize};

/// Where an experiment is in its start/stop/clear cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExperimentState {
    /// Built or cleared; never started since.
    #[default]
    Idle,
    /// Started; input changes schedule passes.
    Running,
    /// Paused after running; data is kept.
    Stopped,
}

impl ExperimentState {
    pub fn is_running(&self) -> bool {
        matches!(self, ExperimentState::Running)
    }

    /// Whether any data may have been recorded.
    pub fn has_started(&self) -> bool {
        !matches!(self, ExperimentState::Idle)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExperimentState::Idle => "Idle",
            ExperimentState::Running => "Running",
            ExperimentState::Stopped => "Stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!ExperimentState::default().has_started());
        assert!(ExperimentState::Running.is_running());
        assert!(ExperimentState::Stopped.has_started());
        assert_eq!(ExperimentState::Stopped.display_name(), "Stopped");
    }
}
