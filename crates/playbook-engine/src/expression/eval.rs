//! Expression evaluation against context variables.
//!
//! Undefined variables and out-of-range paths evaluate to `null`. Ordering
//! comparisons only accept two numbers or two strings.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::ast::{CompareOp, Expr, PathSegment};
use super::ExpressionError;

/// Evaluate an expression to a JSON value.
pub fn evaluate(expr: &Expr, variables: &HashMap<String, Value>) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => Ok(lookup_path(segments, variables).cloned().unwrap_or(Value::Null)),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, variables))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&evaluate(inner, variables)?))),
        Expr::And(left, right) => {
            if !is_truthy(&evaluate(left, variables)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, variables)?)))
        }
        Expr::Or(left, right) => {
            if is_truthy(&evaluate(left, variables)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, variables)?)))
        }
        Expr::Compare { op, left, right } => {
            let left = evaluate(left, variables)?;
            let right = evaluate(right, variables)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

/// Truthiness: null, false, 0, "" and empty collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn lookup_path<'a>(segments: &[PathSegment], variables: &'a HashMap<String, Value>) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let PathSegment::Key(name) = first else {
        return None;
    };

    let mut current = variables.get(name)?;
    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?,
            (PathSegment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Equal => Ok(loose_eq(left, right)),
        CompareOp::NotEqual => Ok(!loose_eq(left, right)),
        CompareOp::Less => order(op, left, right).map(|o| o == Ordering::Less),
        CompareOp::LessEqual => order(op, left, right).map(|o| o != Ordering::Greater),
        CompareOp::Greater => order(op, left, right).map(|o| o == Ordering::Greater),
        CompareOp::GreaterEqual => order(op, left, right).map(|o| o != Ordering::Less),
        CompareOp::In => membership(op, left, right),
        CompareOp::NotIn => membership(op, left, right).map(|found| !found),
        CompareOp::Contains => membership(op, right, left),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn order(op: CompareOp, left: &Value, right: &Value) -> Result<Ordering, ExpressionError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).ok_or_else(|| mismatch(op, left, right))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(mismatch(op, left, right)),
    }
}

fn membership(op: CompareOp, needle: &Value, haystack: &Value) -> Result<bool, ExpressionError> {
    match (needle, haystack) {
        (_, Value::Array(items)) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        (Value::String(n), Value::String(h)) => Ok(h.contains(n.as_str())),
        (Value::String(key), Value::Object(map)) => Ok(map.contains_key(key)),
        (_, Value::Null) => Ok(false),
        _ => Err(mismatch(op, needle, haystack)),
    }
}

fn mismatch(op: CompareOp, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::TypeMismatch {
        op: op.to_string(),
        left: type_name(left).to_string(),
        right: type_name(right).to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
