//! Error types for deployments

use crate::state_machine::DeployState;

/// Main deployment error type
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another deployment is still initiating
    #[error("a deployment is already in progress")]
    Busy,

    /// Illegal state transition
    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// State machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not allowed from the current state
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: DeployState,
        /// Requested state
        to: DeployState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::Stage;

    #[test]
    fn transition_errors_convert() {
        let err: DeployError = StateMachineError::IllegalTransition {
            from: DeployState::Idle,
            to: DeployState::Failed(Stage::Compile),
        }
        .into();
        assert!(matches!(err, DeployError::StateMachine(_)));
        assert!(err.to_string().starts_with("state machine error: illegal transition"));
    }
}
