//! Execution tracking.
//!
//! The [`ExecutionRepository`] owns execution records and their step logs and
//! is injected into the engine. Guarantees expected of an implementation:
//! - step appends and updates for one execution are serialized
//! - status changes follow [`ExecutionStatus::can_transition_to`]
//! - nothing about an execution changes once it is terminal
//! - the cancel flag is readable without taking the record lock

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::execution::{Execution, ExecutionStatus, Step, StepResult};

/// Query filter for [`ExecutionRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub playbook_id: Option<String>,
    pub status: Option<ExecutionStatus>,
}

impl ExecutionFilter {
    pub fn matches(&self, execution: &Execution) -> bool {
        self.playbook_id
            .as_deref()
            .map_or(true, |id| execution.playbook_id == id)
            && self.status.map_or(true, |s| execution.status == s)
    }
}

/// Store of executions and their step logs.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Register a new execution.
    async fn create(&self, execution: Execution) -> EngineResult<()>;

    /// Snapshot of an execution.
    async fn get(&self, id: Uuid) -> EngineResult<Execution>;

    /// Executions matching the filter, oldest first.
    async fn list(&self, filter: &ExecutionFilter) -> EngineResult<Vec<Execution>>;

    /// Append a step to a RUNNING execution, returning its index.
    async fn append_step(&self, id: Uuid, step: Step) -> EngineResult<usize>;

    /// Finish a previously appended step.
    async fn update_step(&self, id: Uuid, index: usize, result: StepResult) -> EngineResult<()>;

    /// Move the execution to `status`, returning the status actually recorded.
    ///
    /// A COMPLETED request on an execution with a pending cancel request is
    /// recorded as CANCELLED.
    async fn set_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> EngineResult<ExecutionStatus>;

    /// Flag the execution for cancellation, returning its status afterwards.
    ///
    /// A PENDING execution is cancelled on the spot. Terminal executions are
    /// rejected with `InvalidState`.
    async fn request_cancel(&self, id: Uuid) -> EngineResult<ExecutionStatus>;

    async fn is_cancel_requested(&self, id: Uuid) -> EngineResult<bool>;

    /// Watch the execution's status.
    async fn subscribe(&self, id: Uuid) -> EngineResult<watch::Receiver<ExecutionStatus>>;
}

struct Record {
    execution: Mutex<Execution>,
    cancel_requested: AtomicBool,
    status_tx: watch::Sender<ExecutionStatus>,
}

impl Record {
    fn new(execution: Execution) -> Self {
        let (status_tx, _) = watch::channel(execution.status);
        Self {
            execution: Mutex::new(execution),
            cancel_requested: AtomicBool::new(false),
            status_tx,
        }
    }
}

/// Process-local execution repository.
#[derive(Default)]
pub struct InMemoryExecutionRepository {
    records: RwLock<HashMap<Uuid, Arc<Record>>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, id: Uuid) -> EngineResult<Arc<Record>> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EngineError::ExecutionNotFound(id))
    }
}

impl std::fmt::Debug for InMemoryExecutionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.records.try_read().map(|r| r.len()).ok();
        f.debug_struct("InMemoryExecutionRepository")
            .field("executions", &count)
            .finish()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: Execution) -> EngineResult<()> {
        let id = execution.id;
        let mut records = self.records.write().await;
        if records.contains_key(&id) {
            return Err(EngineError::InvalidState(format!(
                "Execution {} already exists",
                id
            )));
        }
        records.insert(id, Arc::new(Record::new(execution)));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> EngineResult<Execution> {
        let record = self.record(id).await?;
        let execution = record.execution.lock().await;
        Ok(execution.clone())
    }

    async fn list(&self, filter: &ExecutionFilter) -> EngineResult<Vec<Execution>> {
        let records: Vec<Arc<Record>> = self.records.read().await.values().cloned().collect();

        let mut executions = Vec::new();
        for record in records {
            let execution = record.execution.lock().await;
            if filter.matches(&execution) {
                executions.push(execution.clone());
            }
        }
        executions.sort_by_key(|e| e.started_at);
        Ok(executions)
    }

    async fn append_step(&self, id: Uuid, step: Step) -> EngineResult<usize> {
        let record = self.record(id).await?;
        let mut execution = record.execution.lock().await;
        if execution.status != ExecutionStatus::Running {
            return Err(EngineError::InvalidState(format!(
                "Cannot append step to {} execution {}",
                execution.status, id
            )));
        }
        execution.steps.push(step);
        Ok(execution.steps.len() - 1)
    }

    async fn update_step(&self, id: Uuid, index: usize, result: StepResult) -> EngineResult<()> {
        let record = self.record(id).await?;
        let mut execution = record.execution.lock().await;
        if execution.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "Cannot update step of {} execution {}",
                execution.status, id
            )));
        }
        let step = execution.steps.get_mut(index).ok_or_else(|| {
            EngineError::InvalidState(format!("Execution {} has no step {}", id, index))
        })?;
        step.finish(result);
        Ok(())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> EngineResult<ExecutionStatus> {
        let record = self.record(id).await?;
        let mut execution = record.execution.lock().await;

        let status = if status == ExecutionStatus::Completed
            && record.cancel_requested.load(Ordering::SeqCst)
        {
            ExecutionStatus::Cancelled
        } else {
            status
        };

        if !execution.status.can_transition_to(status) {
            return Err(EngineError::InvalidState(format!(
                "Execution {} cannot move from {} to {}",
                id, execution.status, status
            )));
        }

        debug!(execution_id = %id, from = %execution.status, to = %status, "Execution status change");
        execution.status = status;
        if status.is_terminal() {
            execution.completed_at = Some(Utc::now());
            execution.error = match status {
                ExecutionStatus::Failed => error,
                _ => None,
            };
        }
        record.status_tx.send_replace(status);
        Ok(status)
    }

    async fn request_cancel(&self, id: Uuid) -> EngineResult<ExecutionStatus> {
        let record = self.record(id).await?;
        let mut execution = record.execution.lock().await;

        if execution.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "Execution {} is already {}",
                id, execution.status
            )));
        }

        record.cancel_requested.store(true, Ordering::SeqCst);

        if execution.status == ExecutionStatus::Pending {
            execution.status = ExecutionStatus::Cancelled;
            execution.completed_at = Some(Utc::now());
            record.status_tx.send_replace(ExecutionStatus::Cancelled);
        }
        Ok(execution.status)
    }

    async fn is_cancel_requested(&self, id: Uuid) -> EngineResult<bool> {
        let record = self.record(id).await?;
        Ok(record.cancel_requested.load(Ordering::SeqCst))
    }

    async fn subscribe(&self, id: Uuid) -> EngineResult<watch::Receiver<ExecutionStatus>> {
        let record = self.record(id).await?;
        Ok(record.status_tx.subscribe())
    }
}
