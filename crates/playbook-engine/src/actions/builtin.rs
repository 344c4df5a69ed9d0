use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::dispatch::{Action, ActionError};

/// Logs `message` at `level` (debug, info, warn, error; default info) and
/// echoes the parameters back.
pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ActionError> {
        let message = match parameters.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let level = parameters
            .get("level")
            .and_then(|v| v.as_str())
            .unwrap_or("info");

        match level {
            "debug" => debug!(action = "log", "{}", message),
            "info" => info!(action = "log", "{}", message),
            "warn" | "warning" => warn!(action = "log", "{}", message),
            "error" => error!(action = "log", "{}", message),
            other => {
                return Err(ActionError::InvalidParameters(format!(
                    "unknown log level '{}'",
                    other
                )))
            }
        }

        Ok(Value::Object(parameters.clone()))
    }
}

/// Returns its parameters unchanged so they can be stored via `output_variable`.
pub struct SetVariablesAction;

#[async_trait]
impl Action for SetVariablesAction {
    fn name(&self) -> &'static str {
        "set_variables"
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ActionError> {
        Ok(Value::Object(parameters.clone()))
    }
}

/// Waits `duration_ms` milliseconds.
pub struct SleepAction;

#[async_trait]
impl Action for SleepAction {
    fn name(&self) -> &'static str {
        "sleep"
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ActionError> {
        let duration_ms = match parameters.get("duration_ms") {
            None => 0,
            Some(value) => value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| {
                    ActionError::InvalidParameters(format!(
                        "duration_ms must be a non-negative integer, got {}",
                        value
                    ))
                })?,
        };

        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        Ok(json!({ "slept_ms": duration_ms }))
    }
}

/// Always fails with `message`.
pub struct FailAction;

#[async_trait]
impl Action for FailAction {
    fn name(&self) -> &'static str {
        "fail"
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ActionError> {
        let message = parameters
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("fail action invoked");
        Err(ActionError::ExecutionFailed(message.to_string()))
    }
}
