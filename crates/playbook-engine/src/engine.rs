//! Playbook execution engine.
//!
//! `execute` registers a PENDING execution and spawns one task that walks the
//! graph depth-first from the trigger's successors:
//! - the cancel flag is checked before every component visit
//! - a component already on the current path is a cycle and fails the walk
//! - a component reachable along two paths runs once per path
//! - parallel branches run concurrently on context copies and join before
//!   the walk moves on; changed variables merge back in declaration order
//! - loop iterations run on scoped copies, fail fast, and report outputs in
//!   index order
//!
//! The first unrecovered error fails the execution. Steps already recorded
//! are left as they are.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::dispatch::ActionDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventSink};
use crate::execution::{Execution, ExecutionStatus, Step, StepResult};
use crate::executor::ComponentExecutor;
use crate::playbook::{Component, ComponentType, Playbook, PlaybookRepository};
use crate::result_ext::ResultExt;
use crate::tracker::{ExecutionFilter, ExecutionRepository};

/// Runs playbooks and answers queries about their executions.
#[derive(Clone)]
pub struct ExecutionEngine {
    executor: Arc<ComponentExecutor>,
    executions: Arc<dyn ExecutionRepository>,
    playbooks: Option<Arc<dyn PlaybookRepository>>,
    events: Option<EventSink>,
}

impl ExecutionEngine {
    pub fn new(
        dispatcher: Arc<dyn ActionDispatcher>,
        evaluator: Arc<dyn ConditionEvaluator>,
        executions: Arc<dyn ExecutionRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executor: Arc::new(ComponentExecutor::new(dispatcher, evaluator, config)),
            executions,
            playbooks: None,
            events: None,
        }
    }

    /// Send lifecycle events to `sink`.
    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Enable [`ExecutionEngine::execute_by_id`].
    pub fn with_playbooks(mut self, playbooks: Arc<dyn PlaybookRepository>) -> Self {
        self.playbooks = Some(playbooks);
        self
    }

    /// Start a run of `playbook`.
    ///
    /// Returns the PENDING execution as registered; the walk continues in
    /// the background. Fails with `InvalidState` unless the playbook is active.
    pub async fn execute(
        &self,
        playbook: Arc<Playbook>,
        triggered_by: &str,
        trigger_data: Value,
    ) -> EngineResult<Execution> {
        if !playbook.is_active() {
            return Err(EngineError::InvalidState(format!(
                "Playbook '{}' is {}, only active playbooks can be executed",
                playbook.id, playbook.status
            )));
        }

        let trigger = playbook.trigger()?;
        let defaults = trigger.trigger_config()?.variables;
        let entry = trigger.next.clone();

        let execution = Execution::new(&playbook, triggered_by, trigger_data);
        let mut ctx = ExecutionContext::new(execution.id, &playbook.id, triggered_by);
        ctx.seed(&defaults, &execution.trigger_data);

        self.executions.create(execution.clone()).await?;

        info!(
            execution_id = %execution.id,
            playbook_id = %playbook.id,
            triggered_by = %triggered_by,
            "Execution created"
        );

        let walk = Walk {
            engine: self.clone(),
            playbook,
            execution_id: execution.id,
        };
        tokio::spawn(walk.supervise(entry, ctx));

        Ok(execution)
    }

    /// Load a playbook from the configured repository and execute it.
    pub async fn execute_by_id(
        &self,
        playbook_id: &str,
        triggered_by: &str,
        trigger_data: Value,
    ) -> EngineResult<Execution> {
        let playbooks = self.playbooks.as_ref().ok_or_else(|| {
            EngineError::Config("no playbook repository configured".to_string())
        })?;
        let playbook = playbooks.get(playbook_id).await?;
        self.execute(playbook, triggered_by, trigger_data).await
    }

    /// Request cancellation.
    ///
    /// A PENDING execution is cancelled immediately. A RUNNING one stops
    /// before its next component; the action in flight is allowed to finish.
    pub async fn cancel(&self, execution_id: Uuid) -> EngineResult<Execution> {
        let status = self.executions.request_cancel(execution_id).await?;
        info!(execution_id = %execution_id, status = %status, "Cancellation requested");

        if status == ExecutionStatus::Cancelled {
            self.emit(EngineEvent::ExecutionCancelled {
                execution_id,
                at: Utc::now(),
            })
            .await;
        }

        self.executions.get(execution_id).await
    }

    pub async fn get(&self, execution_id: Uuid) -> EngineResult<Execution> {
        self.executions.get(execution_id).await
    }

    pub async fn list(&self, filter: &ExecutionFilter) -> EngineResult<Vec<Execution>> {
        self.executions.list(filter).await
    }

    /// Wait until the execution is terminal and return it.
    pub async fn wait(&self, execution_id: Uuid) -> EngineResult<Execution> {
        let mut rx = self.executions.subscribe(execution_id).await?;
        rx.wait_for(|status| status.is_terminal())
            .await
            .map(|_| ())
            .map_err(|_| {
                EngineError::InvalidState(format!(
                    "Status channel for execution {} closed",
                    execution_id
                ))
            })?;
        self.executions.get(execution_id).await
    }

    async fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.events {
            sink.emit(event).await;
        }
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("executor", &self.executor)
            .field("playbooks", &self.playbooks.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

/// How a visit ended and the last step output along its path.
#[derive(Debug)]
struct Visit {
    flow: Flow,
    output: Option<Value>,
}

impl Visit {
    fn cancelled(output: Option<Value>) -> Self {
        Self {
            flow: Flow::Cancelled,
            output,
        }
    }

    /// Continue from `own` output, letting a later output on the path win.
    fn after(own: Value, successors: Visit) -> Self {
        Self {
            flow: successors.flow,
            output: successors.output.or(Some(own)),
        }
    }
}

enum Iteration {
    Done(Value),
    Failed(EngineError),
    Cancelled,
    Skipped,
}

/// State of one background walk.
struct Walk {
    engine: ExecutionEngine,
    playbook: Arc<Playbook>,
    execution_id: Uuid,
}

impl Walk {
    /// Run the walk, failing the execution if anything in it panics.
    async fn supervise(self, entry: Vec<String>, ctx: ExecutionContext) {
        let engine = self.engine.clone();
        let id = self.execution_id;

        let Err(panic) = AssertUnwindSafe(self.run(entry, ctx)).catch_unwind().await else {
            return;
        };

        let error = format!("Execution panicked: {}", panic_message(&*panic));
        error!(execution_id = %id, error = %error, "Walk task panicked");

        let recorded = engine
            .executions
            .set_status(id, ExecutionStatus::Failed, Some(error.clone()))
            .await
            .log("record panicked execution");
        if let Ok(ExecutionStatus::Failed) = recorded {
            engine
                .emit(EngineEvent::ExecutionFailed {
                    execution_id: id,
                    error,
                    at: Utc::now(),
                })
                .await;
        }
    }

    async fn run(self, entry: Vec<String>, mut ctx: ExecutionContext) {
        let id = self.execution_id;

        match self
            .engine
            .executions
            .set_status(id, ExecutionStatus::Running, None)
            .await
        {
            Ok(_) => {}
            Err(EngineError::InvalidState(_)) => {
                debug!(execution_id = %id, "Execution cancelled before start");
                return;
            }
            Err(e) => {
                error!(execution_id = %id, error = %e, "Failed to start execution");
                return;
            }
        }

        info!(execution_id = %id, playbook_id = %self.playbook.id, "Execution started");
        self.engine
            .emit(EngineEvent::ExecutionStarted {
                execution_id: id,
                playbook_id: self.playbook.id.clone(),
                at: Utc::now(),
            })
            .await;

        let mut path = Vec::new();
        let (status, error) = match self.visit_all(&entry, &mut ctx, &mut path).await {
            Ok(visit) if visit.flow == Flow::Cancelled => (ExecutionStatus::Cancelled, None),
            Ok(_) => (ExecutionStatus::Completed, None),
            Err(e) => (ExecutionStatus::Failed, Some(e.to_string())),
        };

        let recorded = self
            .engine
            .executions
            .set_status(id, status, error.clone())
            .await
            .log("finalize execution");

        let event = match recorded {
            Ok(ExecutionStatus::Completed) => {
                info!(execution_id = %id, "Execution completed");
                EngineEvent::ExecutionCompleted {
                    execution_id: id,
                    at: Utc::now(),
                }
            }
            Ok(ExecutionStatus::Cancelled) => {
                info!(execution_id = %id, "Execution cancelled");
                EngineEvent::ExecutionCancelled {
                    execution_id: id,
                    at: Utc::now(),
                }
            }
            Ok(ExecutionStatus::Failed) => {
                let error = error.unwrap_or_default();
                error!(execution_id = %id, error = %error, "Execution failed");
                EngineEvent::ExecutionFailed {
                    execution_id: id,
                    error,
                    at: Utc::now(),
                }
            }
            _ => return,
        };
        self.engine.emit(event).await;
    }

    /// Visit `ids` in order, stopping at the first cancellation or error.
    fn visit_all<'a>(
        &'a self,
        ids: &'a [String],
        ctx: &'a mut ExecutionContext,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, EngineResult<Visit>> {
        async move {
            let mut output = None;
            for id in ids {
                let visit = self.visit(id, ctx, path).await?;
                if visit.output.is_some() {
                    output = visit.output;
                }
                if visit.flow == Flow::Cancelled {
                    return Ok(Visit::cancelled(output));
                }
            }
            Ok(Visit {
                flow: Flow::Continue,
                output,
            })
        }
        .boxed()
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        ctx: &'a mut ExecutionContext,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, EngineResult<Visit>> {
        async move {
            if self
                .engine
                .executions
                .is_cancel_requested(self.execution_id)
                .await?
            {
                debug!(execution_id = %self.execution_id, component_id = %id, "Cancelled, not visiting");
                return Ok(Visit::cancelled(None));
            }

            let component = self
                .playbook
                .get_component(id)
                .ok_or_else(|| EngineError::UnknownComponent(id.to_string()))?;

            if path.iter().any(|p| p == id) {
                return Err(EngineError::CycleDetected(id.to_string()));
            }

            path.push(id.to_string());
            let result = match component.component_type {
                ComponentType::Action => self.visit_action(component, ctx, path).await,
                ComponentType::Condition => self.visit_condition(component, ctx, path).await,
                ComponentType::Loop => self.visit_loop(component, ctx, path).await,
                ComponentType::Parallel => self.visit_parallel(component, ctx, path).await,
                ComponentType::Trigger => Err(EngineError::InvalidPlaybook(format!(
                    "Trigger '{}' reached as a successor",
                    id
                ))),
            };
            path.pop();
            result
        }
        .boxed()
    }

    async fn visit_action(
        &self,
        component: &Component,
        ctx: &mut ExecutionContext,
        path: &mut Vec<String>,
    ) -> EngineResult<Visit> {
        let index = self.begin_step(component).await?;

        let output = match self.engine.executor.run_action(component, ctx).await {
            Ok(output) => output,
            Err(e) => return Err(self.fail_step(index, component, e).await),
        };
        self.complete_step(index, component, output.clone()).await?;

        let successors = self.visit_all(&component.next, ctx, path).await?;
        Ok(Visit::after(output, successors))
    }

    async fn visit_condition(
        &self,
        component: &Component,
        ctx: &mut ExecutionContext,
        path: &mut Vec<String>,
    ) -> EngineResult<Visit> {
        let index = self.begin_step(component).await?;

        let outcome = match self.engine.executor.run_condition(component, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail_step(index, component, e).await),
        };
        let own = outcome.output();
        self.complete_step(index, component, own.clone()).await?;

        let mut output = Some(own);
        if let Some(target) = outcome.branch() {
            debug!(
                execution_id = %self.execution_id,
                component_id = %component.id,
                target = %target,
                "Condition branch"
            );
            let branch = self.visit(target, ctx, path).await?;
            if branch.output.is_some() {
                output = branch.output;
            }
            if branch.flow == Flow::Cancelled {
                return Ok(Visit::cancelled(output));
            }
        }

        let successors = self.visit_all(&component.next, ctx, path).await?;
        Ok(Visit {
            flow: successors.flow,
            output: successors.output.or(output),
        })
    }

    async fn visit_loop(
        &self,
        component: &Component,
        ctx: &mut ExecutionContext,
        path: &mut Vec<String>,
    ) -> EngineResult<Visit> {
        let index = self.begin_step(component).await?;

        let prepared = component.loop_config().and_then(|config| {
            let items = self.engine.executor.loop_items(component, &config, ctx)?;
            Ok((config, items))
        });
        let (config, items) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.fail_step(index, component, e).await),
        };

        debug!(
            execution_id = %self.execution_id,
            component_id = %component.id,
            items = items.len(),
            "Loop started"
        );

        let abort = AtomicBool::new(false);
        let concurrency = self.engine.executor.config().loop_concurrency.max(1);
        let results: Vec<Iteration> = {
            let base: &ExecutionContext = ctx;
            let parent_path: &Vec<String> = path;
            let config = &config;
            let abort = &abort;

            futures::stream::iter(items.into_iter().enumerate())
                .map(move |(i, item)| {
                    let mut scoped =
                        base.scoped(&config.item_variable, item, &config.index_variable, i);
                    let mut iteration_path = parent_path.clone();
                    async move {
                        if abort.load(Ordering::SeqCst) {
                            return Iteration::Skipped;
                        }
                        match self.visit(&config.body, &mut scoped, &mut iteration_path).await {
                            Ok(visit) if visit.flow == Flow::Cancelled => {
                                abort.store(true, Ordering::SeqCst);
                                Iteration::Cancelled
                            }
                            Ok(visit) => Iteration::Done(visit.output.unwrap_or(Value::Null)),
                            Err(e) => {
                                abort.store(true, Ordering::SeqCst);
                                Iteration::Failed(e)
                            }
                        }
                    }
                })
                .buffered(concurrency)
                .collect()
                .await
        };

        let mut outputs = Vec::with_capacity(results.len());
        let mut failure = None;
        let mut cancelled = false;
        for result in results {
            match result {
                Iteration::Done(output) => outputs.push(output),
                Iteration::Failed(e) => {
                    failure.get_or_insert(e);
                }
                Iteration::Cancelled => cancelled = true,
                Iteration::Skipped => {}
            }
        }

        if let Some(e) = failure {
            warn!(
                execution_id = %self.execution_id,
                component_id = %component.id,
                completed = outputs.len(),
                "Loop aborted"
            );
            return Err(self.fail_step(index, component, e).await);
        }
        if cancelled {
            self.cancel_step(index, Some(Value::Array(outputs))).await?;
            return Ok(Visit::cancelled(None));
        }

        let output = Value::Array(outputs);
        if let Some(name) = &config.output_variable {
            ctx.set_variable(name.clone(), output.clone());
        }
        self.complete_step(index, component, output.clone()).await?;

        let successors = self.visit_all(&component.next, ctx, path).await?;
        Ok(Visit::after(output, successors))
    }

    async fn visit_parallel(
        &self,
        component: &Component,
        ctx: &mut ExecutionContext,
        path: &mut Vec<String>,
    ) -> EngineResult<Visit> {
        let index = self.begin_step(component).await?;

        let config = match component.parallel_config() {
            Ok(config) => config,
            Err(e) => return Err(self.fail_step(index, component, e).await),
        };

        debug!(
            execution_id = %self.execution_id,
            component_id = %component.id,
            branches = config.branches.len(),
            "Parallel fan-out"
        );

        let base = ctx.variables.clone();
        let branches: Vec<(&String, ExecutionContext, Vec<String>)> = config
            .branches
            .iter()
            .map(|branch_id| (branch_id, ctx.branch(), path.clone()))
            .collect();

        let results = join_all(branches.into_iter().map(
            move |(branch_id, mut branch_ctx, mut branch_path)| async move {
                let result = self.visit(branch_id, &mut branch_ctx, &mut branch_path).await;
                (result, branch_ctx)
            },
        ))
        .await;

        let mut outputs = Vec::with_capacity(results.len());
        let mut failure = None;
        let mut cancelled = false;
        for (result, branch_ctx) in results {
            match result {
                Ok(visit) => {
                    ctx.merge_branch(&base, &branch_ctx);
                    cancelled |= visit.flow == Flow::Cancelled;
                    outputs.push(visit.output.unwrap_or(Value::Null));
                }
                Err(e) => {
                    outputs.push(Value::Null);
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(self.fail_step(index, component, e).await);
        }
        if cancelled {
            self.cancel_step(index, Some(Value::Array(outputs))).await?;
            return Ok(Visit::cancelled(None));
        }

        let output = Value::Array(outputs);
        if let Some(name) = &config.output_variable {
            ctx.set_variable(name.clone(), output.clone());
        }
        self.complete_step(index, component, output.clone()).await?;

        let successors = self.visit_all(&component.next, ctx, path).await?;
        Ok(Visit::after(output, successors))
    }

    async fn begin_step(&self, component: &Component) -> EngineResult<usize> {
        let index = self
            .engine
            .executions
            .append_step(self.execution_id, Step::started(component))
            .await?;

        debug!(
            execution_id = %self.execution_id,
            component_id = %component.id,
            component_type = %component.component_type,
            "Step started"
        );
        self.engine
            .emit(EngineEvent::StepStarted {
                execution_id: self.execution_id,
                component_id: component.id.clone(),
                component_type: component.component_type,
                at: Utc::now(),
            })
            .await;
        Ok(index)
    }

    async fn complete_step(
        &self,
        index: usize,
        component: &Component,
        output: Value,
    ) -> EngineResult<()> {
        self.engine
            .executions
            .update_step(self.execution_id, index, StepResult::Completed(output.clone()))
            .await?;
        self.engine
            .emit(EngineEvent::StepCompleted {
                execution_id: self.execution_id,
                component_id: component.id.clone(),
                output,
                at: Utc::now(),
            })
            .await;
        Ok(())
    }

    /// Record the step as FAILED and hand the error back for propagation.
    async fn fail_step(&self, index: usize, component: &Component, err: EngineError) -> EngineError {
        let message = err.to_string();
        error!(
            execution_id = %self.execution_id,
            component_id = %component.id,
            error = %message,
            "Step failed"
        );

        let _ = self
            .engine
            .executions
            .update_step(self.execution_id, index, StepResult::Failed(message.clone()))
            .await
            .log("record step failure");

        self.engine
            .emit(EngineEvent::StepFailed {
                execution_id: self.execution_id,
                component_id: component.id.clone(),
                error: message,
                at: Utc::now(),
            })
            .await;
        err
    }

    async fn cancel_step(&self, index: usize, output: Option<Value>) -> EngineResult<()> {
        self.engine
            .executions
            .update_step(self.execution_id, index, StepResult::Cancelled(output))
            .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
