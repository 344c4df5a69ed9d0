//! Action registry and dispatch.
//!
//! The engine never performs side effects itself: every action component is
//! handed to an [`ActionDispatcher`] with its resolved parameters. The
//! [`ActionRegistry`] is the default dispatcher, mapping action type names to
//! [`Action`] implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned by a dispatcher.
#[derive(Debug, Error)]
pub enum ActionError {
    /// No handler is registered for the action type.
    #[error("Action not found: {0}")]
    UnknownAction(String),

    /// The handler ran and failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The resolved parameters are not usable by the handler.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Performs the side effect named by an action type.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        action_type: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, ActionError>;
}

/// A single named action handler.
#[async_trait]
pub trait Action: Send + Sync {
    /// Action type this handler answers to.
    fn name(&self) -> &'static str;

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ActionError>;
}

/// Registry of action handlers keyed by action type.
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Create a registry with the built-in actions registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::actions::register_builtins(&mut registry);
        registry
    }

    /// Register a handler, replacing any previous handler of the same name.
    pub fn register<A: Action + 'static>(&mut self, action: A) {
        self.actions
            .insert(action.name().to_string(), Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action types, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.list())
            .finish()
    }
}

#[async_trait]
impl ActionDispatcher for ActionRegistry {
    async fn dispatch(
        &self,
        action_type: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, ActionError> {
        let action = self
            .get(action_type)
            .ok_or_else(|| ActionError::UnknownAction(action_type.to_string()))?;
        action.execute(parameters).await
    }
}
