//! Deployment state machine
//!
//! ```text
//! Idle -> Snapshotting -> Compiling -> Uploading -> Succeeded | Canceled
//!                                   -> Running   -> Succeeded
//!                                   -> Done      -> Succeeded
//! ```
//!
//! Any active state may fail with the stage that failed.

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a deployment, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Local metadata validation
    Validate,
    /// Notebook snapshot
    Snapshot,
    /// Pipeline compilation
    Compile,
    /// Pipeline upload
    Upload,
    /// Run creation
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validate => "validate",
            Stage::Snapshot => "snapshot",
            Stage::Compile => "compile",
            Stage::Upload => "upload",
            Stage::Run => "run",
        })
    }
}

/// State of one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum DeployState {
    /// Created, nothing started
    #[default]
    Idle,
    /// Taking the notebook snapshot
    Snapshotting,
    /// Compiling the pipeline
    Compiling,
    /// Uploading the compiled pipeline
    Uploading,
    /// Creating a run
    Running,
    /// Compiled, nothing else requested
    Done,
    /// All requested stages finished
    Succeeded,
    /// A stage failed
    Failed(Stage),
    /// The user declined to overwrite an existing pipeline
    Canceled,
}

impl DeployState {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Canceled)
    }

    /// Stage that failed, if any
    #[inline]
    #[must_use]
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Failed(stage) => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Snapshotting => f.write_str("snapshotting"),
            Self::Compiling => f.write_str("compiling"),
            Self::Uploading => f.write_str("uploading"),
            Self::Running => f.write_str("running"),
            Self::Done => f.write_str("done"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(stage) => write!(f, "failed ({stage})"),
            Self::Canceled => f.write_str("canceled"),
        }
    }
}

/// Validates a state transition
pub fn validate_transition(from: DeployState, to: DeployState) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: DeployState) -> Vec<DeployState> {
    use DeployState::*;
    match from {
        Idle => vec![Snapshotting, Compiling, Failed(Stage::Validate)],
        Snapshotting => vec![Compiling, Failed(Stage::Snapshot)],
        Compiling => vec![Uploading, Running, Done, Failed(Stage::Compile)],
        Uploading => vec![Succeeded, Canceled, Failed(Stage::Upload)],
        Running => vec![Succeeded, Failed(Stage::Run)],
        Done => vec![Succeeded],
        Succeeded | Failed(_) | Canceled => vec![],
    }
}

fn allowed(from: DeployState, to: DeployState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_run_path() {
        let path = [
            DeployState::Idle,
            DeployState::Snapshotting,
            DeployState::Compiling,
            DeployState::Running,
            DeployState::Succeeded,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
    }

    #[test]
    fn snapshot_can_be_skipped() {
        assert!(validate_transition(DeployState::Idle, DeployState::Compiling).is_ok());
    }

    #[test]
    fn failure_is_attributed_to_the_active_stage() {
        assert!(validate_transition(
            DeployState::Compiling,
            DeployState::Failed(Stage::Compile)
        )
        .is_ok());
        assert!(validate_transition(
            DeployState::Compiling,
            DeployState::Failed(Stage::Upload)
        )
        .is_err());
    }

    #[test]
    fn terminal_states_are_final() {
        for state in [
            DeployState::Succeeded,
            DeployState::Canceled,
            DeployState::Failed(Stage::Run),
        ] {
            assert!(state.is_terminal());
            assert!(allowed_transitions(state).is_empty());
        }
    }

    #[test]
    fn cancel_only_from_upload() {
        assert!(validate_transition(DeployState::Uploading, DeployState::Canceled).is_ok());
        assert!(validate_transition(DeployState::Running, DeployState::Canceled).is_err());
    }

    #[test]
    fn display() {
        assert_eq!(DeployState::Failed(Stage::Snapshot).to_string(), "failed (snapshot)");
    }
}
