//! Coordinator lifecycle state machine types.

use serde::{Deserialize, Serialize};

/// The lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Background loops are running.
    #[default]
    Running,

    /// Shutdown is in progress.
    Stopping {
        /// Current shutdown phase.
        phase: ShutdownPhase,
    },

    /// Background loops have exited (or were abandoned) and pools are empty.
    Stopped,
}

impl LifecycleState {
    /// Returns true if the background loops are running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if shutdown is in progress.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns true if the coordinator has shut down.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Stopping { .. } => "Stopping",
            Self::Stopped => "Stopped",
        }
    }
}

/// Shutdown phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPhase {
    /// Raising the cancellation signal.
    SignalWorkers,

    /// Waiting (bounded) for the monitor loops to exit.
    JoinWorkers,

    /// Clearing both buffer pools.
    ReleasePools,
}

impl ShutdownPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::SignalWorkers => Some(Self::JoinWorkers),
            Self::JoinWorkers => Some(Self::ReleasePools),
            Self::ReleasePools => None,
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::SignalWorkers => "Signalling monitors",
            Self::JoinWorkers => "Joining monitors",
            Self::ReleasePools => "Releasing buffer pools",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_phases_run_in_order() {
        let mut phases = vec![ShutdownPhase::SignalWorkers];
        while let Some(next) = phases.last().and_then(|p| p.next()) {
            phases.push(next);
        }
        assert_eq!(
            phases,
            vec![
                ShutdownPhase::SignalWorkers,
                ShutdownPhase::JoinWorkers,
                ShutdownPhase::ReleasePools,
            ]
        );
    }

    #[test]
    fn lifecycle_predicates() {
        assert!(LifecycleState::Running.is_running());
        assert!(LifecycleState::Stopping {
            phase: ShutdownPhase::JoinWorkers
        }
        .is_stopping());
        assert!(LifecycleState::Stopped.is_stopped());
        assert_eq!(LifecycleState::default().name(), "Running");
    }
}
