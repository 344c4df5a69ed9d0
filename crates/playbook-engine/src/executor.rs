//! Per-component execution.
//!
//! `ComponentExecutor` runs the leaf work of a component against the two
//! capabilities (action dispatch, condition evaluation). Graph decisions,
//! step records and concurrency stay in the engine.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::dispatch::ActionDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::playbook::{Component, ConditionConfig, LoopConfig};
use crate::variables;

/// Result of evaluating a condition component.
#[derive(Debug, Clone)]
pub struct ConditionOutcome {
    pub config: ConditionConfig,
    pub matched: bool,
    /// Evaluation error that was recovered as `false`.
    pub error: Option<String>,
}

impl ConditionOutcome {
    /// Branch target chosen by the result, if configured.
    pub fn branch(&self) -> Option<&str> {
        if self.matched {
            self.config.true_next.as_deref()
        } else {
            self.config.false_next.as_deref()
        }
    }

    /// Step output recorded for the condition.
    pub fn output(&self) -> Value {
        let mut output = json!({
            "expression": self.config.expression,
            "result": self.matched,
        });
        if let Some(error) = &self.error {
            output["error"] = Value::String(error.clone());
        }
        output
    }
}

pub struct ComponentExecutor {
    dispatcher: Arc<dyn ActionDispatcher>,
    evaluator: Arc<dyn ConditionEvaluator>,
    config: EngineConfig,
}

impl ComponentExecutor {
    pub fn new(
        dispatcher: Arc<dyn ActionDispatcher>,
        evaluator: Arc<dyn ConditionEvaluator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            dispatcher,
            evaluator,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve parameters, dispatch the action and store the result in
    /// `output_variable` when one is configured.
    pub async fn run_action(
        &self,
        component: &Component,
        ctx: &mut ExecutionContext,
    ) -> EngineResult<Value> {
        let config = component.action_config()?;

        let parameters: Map<String, Value> = config
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), variables::resolve(v, &ctx.variables)))
            .collect();

        debug!(
            execution_id = %ctx.execution_id,
            component_id = %component.id,
            action_type = %config.action_type,
            "Dispatching action"
        );

        let output = self
            .dispatcher
            .dispatch(&config.action_type, &parameters)
            .await
            .map_err(|e| EngineError::from_action(&config.action_type, e))?;

        if let Some(name) = config.output_variable {
            ctx.set_variable(name, output.clone());
        }
        Ok(output)
    }

    /// Evaluate the condition. Evaluator errors are logged and read as `false`.
    pub async fn run_condition(
        &self,
        component: &Component,
        ctx: &ExecutionContext,
    ) -> EngineResult<ConditionOutcome> {
        let config = component.condition_config()?;

        let (matched, error) = match self
            .evaluator
            .evaluate(&config.expression, &ctx.variables)
            .await
        {
            Ok(matched) => (matched, None),
            Err(e) => {
                let err = EngineError::from(e);
                warn!(
                    execution_id = %ctx.execution_id,
                    component_id = %component.id,
                    expression = %config.expression,
                    error = %err,
                    "Condition evaluation failed, treating as false"
                );
                (false, Some(err.to_string()))
            }
        };

        debug!(
            execution_id = %ctx.execution_id,
            component_id = %component.id,
            matched,
            "Condition evaluated"
        );

        Ok(ConditionOutcome {
            config,
            matched,
            error,
        })
    }

    /// Elements of the loop's collection variable.
    pub fn loop_items(
        &self,
        component: &Component,
        config: &LoopConfig,
        ctx: &ExecutionContext,
    ) -> EngineResult<Vec<Value>> {
        let collection = ctx.get_variable(&config.collection).ok_or_else(|| {
            EngineError::InvalidConfig(format!(
                "Loop '{}': collection variable '{}' is not defined",
                component.id, config.collection
            ))
        })?;

        let Value::Array(items) = collection else {
            return Err(EngineError::InvalidConfig(format!(
                "Loop '{}': variable '{}' is not an array",
                component.id, config.collection
            )));
        };

        if items.len() > self.config.max_loop_items {
            return Err(EngineError::InvalidConfig(format!(
                "Loop '{}': {} items exceeds the limit of {}",
                component.id,
                items.len(),
                self.config.max_loop_items
            )));
        }

        Ok(items.clone())
    }
}

impl std::fmt::Debug for ComponentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentExecutor")
            .field("config", &self.config)
            .finish()
    }
}
