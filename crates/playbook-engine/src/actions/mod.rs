//! Built-in actions.
//!
//! These cover playbook plumbing only (logging, variable shaping, delays and
//! forced failure). Integrations with security tooling are registered by the
//! embedding service.

mod builtin;

pub use builtin::{FailAction, LogAction, SetVariablesAction, SleepAction};

use crate::dispatch::ActionRegistry;

/// Register every built-in action.
pub fn register_builtins(registry: &mut ActionRegistry) {
    registry.register(LogAction);
    registry.register(SetVariablesAction);
    registry.register(SleepAction);
    registry.register(FailAction);
}
