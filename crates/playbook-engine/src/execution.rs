//! Execution and step records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::playbook::{Component, ComponentType, Playbook};

/// Lifecycle status shared by executions and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    /// Registered, walk not started.
    Pending,
    /// Walk in progress.
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Allowed transitions: PENDING -> RUNNING -> {COMPLETED, FAILED, CANCELLED},
    /// plus PENDING -> {CANCELLED, FAILED} for runs that never start.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Completed(Value),
    Failed(String),
    /// A loop or parallel step interrupted by cancellation, with any partial output.
    Cancelled(Option<Value>),
}

/// Record of one component run within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub component_id: String,
    pub component_name: String,
    pub component_type: ComponentType,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    /// A RUNNING step for the component, started now.
    pub fn started(component: &Component) -> Self {
        Self {
            component_id: component.id.clone(),
            component_name: component.display_name().to_string(),
            component_type: component.component_type,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
        }
    }

    /// Apply the step's result and stamp the completion time.
    pub fn finish(&mut self, result: StepResult) {
        match result {
            StepResult::Completed(output) => {
                self.status = ExecutionStatus::Completed;
                self.output = Some(output);
            }
            StepResult::Failed(error) => {
                self.status = ExecutionStatus::Failed;
                self.error = Some(error);
            }
            StepResult::Cancelled(output) => {
                self.status = ExecutionStatus::Cancelled;
                self.output = output;
            }
        }
        self.completed_at = Some(Utc::now());
    }
}

/// One run of a playbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub playbook_id: String,
    pub playbook_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub triggered_by: String,
    pub trigger_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Execution {
    /// A new PENDING execution for the playbook.
    pub fn new(playbook: &Playbook, triggered_by: impl Into<String>, trigger_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            playbook_id: playbook.id.clone(),
            playbook_name: playbook.name.clone(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            triggered_by: triggered_by.into(),
            trigger_data,
            error: None,
            steps: Vec::new(),
        }
    }

    /// Steps for a component, in the order they ran.
    pub fn steps_for<'a>(&'a self, component_id: &'a str) -> impl Iterator<Item = &'a Step> + 'a {
        self.steps.iter().filter(move |s| s.component_id == component_id)
    }

    /// Component ids in step order.
    pub fn visited(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.component_id.as_str()).collect()
    }
}
