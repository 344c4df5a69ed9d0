//! Black-Cross playbook execution engine.
//!
//! Interprets security response playbooks: directed graphs of trigger,
//! action, condition, loop and parallel components. Runs them against a
//! per-execution variable context and records a step log for each run.
//!
//! Side effects go through an [`ActionDispatcher`], branching through a
//! [`ConditionEvaluator`], and execution records through an injected
//! [`ExecutionRepository`].

pub mod actions;
pub mod condition;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod executor;
pub mod expression;
pub mod playbook;
pub mod result_ext;
pub mod tracker;
pub mod variables;

pub use condition::{ConditionEvaluator, ExpressionEvaluator};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use dispatch::{Action, ActionDispatcher, ActionError, ActionRegistry};
pub use engine::ExecutionEngine;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventSink};
pub use execution::{Execution, ExecutionStatus, Step, StepResult};
pub use expression::{Expression, ExpressionError};
pub use playbook::{
    parse_playbook, validate_playbook, Component, ComponentType, InMemoryPlaybookRepository,
    Playbook, PlaybookRepository, PlaybookStatus,
};
pub use tracker::{ExecutionFilter, ExecutionRepository, InMemoryExecutionRepository};
