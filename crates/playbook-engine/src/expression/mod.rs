//! Condition expression language.
//!
//! Expressions are parsed into a small syntax tree and evaluated against the
//! execution variables. The grammar has no calls, assignments or attribute
//! access beyond data paths, so a playbook author cannot reach host code.
//!
//! Supported:
//! - literals: numbers, `'strings'` / `"strings"`, `true`, `false`, `null`, `[lists]`
//! - variable paths: `alert.severity`, `hosts[0]`, `hosts.0.name`
//! - comparisons: `==` `!=` `<` `<=` `>` `>=` (`===` / `!==` accepted as aliases)
//! - membership: `x in list`, `x not in list`, `list contains x`
//! - logic: `&&` / `and`, `||` / `or`, `!` / `not`, parentheses

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

pub use ast::{CompareOp, Expr, PathSegment};
pub use eval::is_truthy;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("Cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    /// Raised by evaluators other than the built-in one.
    #[error("Evaluator error: {0}")]
    Evaluator(String),
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression string.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = lexer::Lexer::new(source).tokenize()?;
        let ast = parser::Parser::new(tokens).parse()?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate to a JSON value.
    pub fn evaluate_value(&self, variables: &HashMap<String, Value>) -> Result<Value, ExpressionError> {
        eval::evaluate(&self.ast, variables)
    }

    /// Evaluate and reduce the result to a boolean by truthiness.
    pub fn evaluate(&self, variables: &HashMap<String, Value>) -> Result<bool, ExpressionError> {
        self.evaluate_value(variables).map(|v| is_truthy(&v))
    }
}
