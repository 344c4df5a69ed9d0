//! Error types for the playbook engine.

use thiserror::Error;
use uuid::Uuid;

use crate::dispatch::ActionError;
use crate::expression::ExpressionError;

/// Errors raised while starting, walking or tracking a playbook execution.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Operation not allowed in the current lifecycle state
    /// (executing an inactive playbook, cancelling a finished execution).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A `next` or branch field references a component that does not exist.
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// The action type is not registered with the dispatcher.
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    /// The condition evaluator failed. Recovered as `false` during a walk.
    #[error("Condition evaluation failed: {0}")]
    Evaluation(String),

    /// Action dispatch failed.
    #[error("Action '{action_type}' failed: {message}")]
    ActionExecution {
        action_type: String,
        message: String,
    },

    /// Execution id is not known to the tracker.
    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    /// Playbook id is not known to the playbook repository.
    #[error("Playbook not found: {0}")]
    PlaybookNotFound(String),

    /// Playbook definition is structurally unusable (no trigger, trigger as successor).
    #[error("Invalid playbook: {0}")]
    InvalidPlaybook(String),

    /// Component config does not match its component type.
    #[error("Invalid component config: {0}")]
    InvalidConfig(String),

    /// A component was reached again while still on the current walk path.
    #[error("Cycle detected at component: {0}")]
    CycleDetected(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Map a dispatcher error for the given action type into the engine taxonomy.
    pub fn from_action(action_type: &str, err: ActionError) -> Self {
        match err {
            ActionError::UnknownAction(name) => EngineError::UnknownAction(name),
            other => EngineError::ActionExecution {
                action_type: action_type.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ExpressionError> for EngineError {
    fn from(err: ExpressionError) -> Self {
        EngineError::Evaluation(err.to_string())
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_error() {
        let err = EngineError::InvalidState("execution already completed".to_string());
        assert_eq!(err.to_string(), "Invalid state: execution already completed");
    }

    #[test]
    fn test_unknown_action_mapping() {
        let err = EngineError::from_action(
            "block_ip",
            ActionError::UnknownAction("block_ip".to_string()),
        );
        assert!(matches!(err, EngineError::UnknownAction(ref name) if name == "block_ip"));
    }

    #[test]
    fn test_action_failure_mapping() {
        let err = EngineError::from_action(
            "block_ip",
            ActionError::ExecutionFailed("firewall unreachable".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "Action 'block_ip' failed: Execution failed: firewall unreachable"
        );
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EngineError = json_err.into();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
