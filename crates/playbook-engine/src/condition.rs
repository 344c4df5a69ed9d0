//! Condition evaluation capability.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::expression::{Expression, ExpressionError};

/// Evaluates a condition expression against execution variables.
///
/// Implementations must not give expressions access to anything beyond the
/// variables passed in.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        expression: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<bool, ExpressionError>;
}

/// Evaluator backed by the built-in expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

#[async_trait]
impl ConditionEvaluator for ExpressionEvaluator {
    async fn evaluate(
        &self,
        expression: &str,
        variables: &HashMap<String, Value>,
    ) -> Result<bool, ExpressionError> {
        Expression::parse(expression)?.evaluate(variables)
    }
}
