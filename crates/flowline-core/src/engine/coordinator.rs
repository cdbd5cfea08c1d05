//! ExecutionCoordinator — the execution state machine.
//!
//! ```text
//! PERSISTED → TAKEN → STEP_SCHEDULED → STEP_FINISHED → (STEP_SCHEDULED ⇄ STEP_FINISHED)*
//!                                                     → EXECUTION_FINISHED
//!            ERROR is reachable from every non-terminal status
//! ```
//!
//! Every transition is a conditional store update, so redelivered messages
//! degrade to no-ops. Internal steps are evaluated in a loop that runs until
//! the next external dispatch or a terminal status.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    ExecutionStatus, NewExecutionRequest, ParamSource, StepCompletionNotice, StepKind,
    StepScheduleExceptionNotice, StepScheduleRequest, WorkflowExecution,
};
use crate::store::{ExecutionStore, OutputStore, RecordedOutput};

use super::internal::{InternalOutcome, InternalStepExecutor};
use super::resolver::ParameterResolver;
use super::StepDispatchQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub already_run: bool,
    pub could_run: bool,
}

/// Where an advance stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// An external step was accepted by the dispatch queue.
    Dispatched { step: String },
    /// The dispatch queue refused the step; the execution is left as is.
    Rejected { step: String, reason: String },
    /// No steps remain; the execution is EXECUTION_FINISHED.
    Finished,
    /// The execution was already terminal.
    Halted(ExecutionStatus),
    /// A redelivered completion for a step whose successor is already scheduled.
    AlreadyAdvanced,
    /// The plan could not continue and the execution was marked ERROR.
    Failed { reason: String },
}

pub struct ExecutionCoordinator {
    store: Arc<dyn ExecutionStore>,
    outputs: Arc<dyn OutputStore>,
    queue: Arc<dyn StepDispatchQueue>,
    resolver: ParameterResolver,
    internal: InternalStepExecutor,
}

impl ExecutionCoordinator {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        outputs: Arc<dyn OutputStore>,
        queue: Arc<dyn StepDispatchQueue>,
    ) -> Self {
        Self {
            resolver: ParameterResolver::new(outputs.clone()),
            internal: InternalStepExecutor::new(),
            store,
            outputs,
            queue,
        }
    }

    // ─── Inbound operations ─────────────────────────────────────────────

    pub async fn start_execution(&self, request: NewExecutionRequest) -> EngineResult<StartOutcome> {
        let execution = WorkflowExecution::from_request(request);
        let id = execution.execution_id.clone();

        if !self.store.create_if_absent(&execution).await? {
            tracing::warn!("[Coordinator] {}: execution already exists, ignoring start", id);
            return Ok(StartOutcome {
                already_run: true,
                could_run: false,
            });
        }
        tracing::info!(
            "[Coordinator] {}: persisted '{}' with {} step(s)",
            id,
            execution.name,
            execution.plan.steps.len()
        );

        self.outputs.create_namespace(&id).await?;
        self.set_status(&id, ExecutionStatus::Taken).await?;

        if let Some(first) = execution.plan.steps.first() {
            for param in &first.params {
                if let ParamSource::From(source) = param.source() {
                    tracing::error!(
                        "[Coordinator] {}: first step '{}' param '{}' references output of '{}'",
                        id,
                        first.name,
                        param.name,
                        source
                    );
                }
            }
        }

        let could_run = matches!(
            self.advance(&id).await?,
            AdvanceOutcome::Dispatched { .. } | AdvanceOutcome::Finished
        );
        Ok(StartOutcome {
            already_run: false,
            could_run,
        })
    }

    /// Record a completed step and move the execution forward.
    ///
    /// Only the step the plan is waiting for is accepted: the one after
    /// `lastStepRun`, or the target a decision chose. A completion for any
    /// other step fails with `MissingExecutionData` and changes nothing.
    pub async fn on_step_completion(
        &self,
        notice: &StepCompletionNotice,
    ) -> EngineResult<AdvanceOutcome> {
        let id = &notice.execution_id;
        let step_name = &notice.step_name;
        let current = self.load(id).await?;
        if current.status.is_terminal() {
            return Ok(AdvanceOutcome::Halted(current.status));
        }

        if current.outputs.contains_key(step_name) {
            // Still STEP_FINISHED: the follow-up dispatch was refused on an
            // earlier delivery, so try it again.
            if current.status == ExecutionStatus::StepFinished {
                return self.advance(id).await;
            }
            tracing::debug!(
                "[Coordinator] {}: duplicate completion of '{}' ignored",
                id,
                step_name
            );
            return Ok(AdvanceOutcome::AlreadyAdvanced);
        }

        let awaited = next_index(&current)
            .ok()
            .and_then(|index| current.plan.steps.get(index));
        if awaited.map(|step| &step.name) != Some(step_name) {
            tracing::error!(
                "[Coordinator] {}: completion of '{}' does not match the awaited step {:?}",
                id,
                step_name,
                awaited.map(|step| step.name.as_str())
            );
            return Err(EngineError::missing_data(format!(
                "Execution {} is not waiting for step '{}'",
                id, step_name
            )));
        }

        let recorded = self
            .save_step_answer(id, &notice.output_locator, step_name, None)
            .await?;
        if !recorded.inserted {
            tracing::debug!(
                "[Coordinator] {}: completion of '{}' already recorded concurrently",
                id,
                step_name
            );
            return Ok(AdvanceOutcome::AlreadyAdvanced);
        }
        self.advance(id).await
    }

    pub async fn handle_schedule_exception(
        &self,
        notice: &StepScheduleExceptionNotice,
    ) -> EngineResult<WorkflowExecution> {
        tracing::warn!(
            "[Coordinator] {}: scheduler reported {}",
            notice.execution_id,
            notice.reason
        );
        self.mark_error(&notice.execution_id, &notice.reason).await
    }

    /// Continue a stalled execution, e.g. after a rejected dispatch.
    pub async fn resume(&self, execution_id: &str) -> EngineResult<AdvanceOutcome> {
        let execution = self.load(execution_id).await?;
        if execution.status == ExecutionStatus::Persisted {
            self.outputs.create_namespace(execution_id).await?;
            self.set_status(execution_id, ExecutionStatus::Taken).await?;
        }
        self.advance(execution_id).await
    }

    // ─── State machine ──────────────────────────────────────────────────

    /// Run internal steps until the next external dispatch or a terminal status.
    pub async fn advance(&self, execution_id: &str) -> EngineResult<AdvanceOutcome> {
        loop {
            let execution = self.load(execution_id).await?;
            if execution.status.is_terminal() {
                tracing::debug!(
                    "[Coordinator] {}: already {}, nothing to advance",
                    execution_id,
                    execution.status.as_str()
                );
                return Ok(AdvanceOutcome::Halted(execution.status));
            }

            let index = next_index(&execution)?;
            let Some(step) = execution.plan.steps.get(index) else {
                self.set_status(execution_id, ExecutionStatus::ExecutionFinished)
                    .await?;
                tracing::info!("[Coordinator] {}: execution finished", execution_id);
                return Ok(AdvanceOutcome::Finished);
            };

            let args = self.resolver.resolve(step, &execution).await;

            if let StepKind::External(task) = step.kind() {
                let request = StepScheduleRequest {
                    workflow_execution_id: execution_id.to_string(),
                    name: step.name.clone(),
                    task,
                    input_args: args,
                };
                return self.dispatch(request).await;
            }

            let (text, branch) = match self.internal.execute(step, &args) {
                Ok(InternalOutcome::Output(text)) => (text, None),
                Ok(InternalOutcome::Branch(target)) => {
                    if let Err(reason) = check_branch(&execution, index, &target) {
                        self.mark_error(execution_id, &reason).await?;
                        return Ok(AdvanceOutcome::Failed { reason });
                    }
                    tracing::info!(
                        "[Coordinator] {}: decision '{}' continues with '{}'",
                        execution_id,
                        step.name,
                        target
                    );
                    (target.clone(), Some(target))
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.mark_error(execution_id, &reason).await?;
                    return Ok(AdvanceOutcome::Failed { reason });
                }
            };

            let locator = self
                .outputs
                .write(execution_id, &step.name, text.as_bytes())
                .await?;
            let recorded = self
                .save_step_answer(execution_id, &locator, &step.name, branch.as_deref())
                .await?;
            if !recorded.inserted {
                // A concurrent advance evaluated this step first.
                return Ok(AdvanceOutcome::AlreadyAdvanced);
            }
        }
    }

    /// Idempotently record a step output. The execution becomes STEP_FINISHED
    /// only when this call stored the output; a repeat leaves the status alone.
    pub async fn save_step_answer(
        &self,
        execution_id: &str,
        output_locator: &str,
        step_name: &str,
        branch_target: Option<&str>,
    ) -> EngineResult<RecordedOutput> {
        let mut recorded = self
            .store
            .record_step_output(execution_id, step_name, output_locator, branch_target)
            .await?
            .ok_or_else(|| missing(execution_id))?;
        if !recorded.inserted {
            return Ok(recorded);
        }
        tracing::info!(
            "[Coordinator] {}: step '{}' answered at {}",
            execution_id,
            step_name,
            output_locator
        );
        recorded.execution = self
            .set_status(execution_id, ExecutionStatus::StepFinished)
            .await?;
        Ok(recorded)
    }

    /// Move the execution to ERROR. Failing to persist this is fatal.
    pub async fn mark_error(
        &self,
        execution_id: &str,
        reason: &str,
    ) -> EngineResult<WorkflowExecution> {
        match self.store.mark_error(execution_id, reason).await {
            Ok(execution) => {
                tracing::warn!("[Coordinator] {}: marked as ERROR ({})", execution_id, reason);
                Ok(execution)
            }
            Err(e) => {
                tracing::error!(
                    "[Coordinator] {}: could not record error '{}': {}",
                    execution_id,
                    reason,
                    e
                );
                Err(e)
            }
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    async fn dispatch(&self, request: StepScheduleRequest) -> EngineResult<AdvanceOutcome> {
        let receipt = self.queue.enqueue(&request).await;
        let id = &request.workflow_execution_id;
        if !receipt.queued {
            let reason = receipt
                .error
                .unwrap_or_else(|| "dispatch queue refused the step".to_string());
            tracing::warn!(
                "[Coordinator] {}: step '{}' not queued: {}",
                id,
                request.name,
                reason
            );
            return Ok(AdvanceOutcome::Rejected {
                step: request.name,
                reason,
            });
        }

        self.set_status(id, ExecutionStatus::StepScheduled).await?;
        tracing::info!(
            "[Coordinator] {}: step '{}' scheduled on task '{}'",
            id,
            request.name,
            request.task
        );
        Ok(AdvanceOutcome::Dispatched { step: request.name })
    }

    async fn set_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> EngineResult<WorkflowExecution> {
        self.store
            .conditional_update_status(execution_id, status)
            .await?
            .ok_or_else(|| missing(execution_id))
    }

    async fn load(&self, execution_id: &str) -> EngineResult<WorkflowExecution> {
        self.store
            .get_by_id(execution_id)
            .await?
            .ok_or_else(|| missing(execution_id))
    }
}

/// Index of the step to run next; `steps.len()` once the plan is done.
fn next_index(execution: &WorkflowExecution) -> EngineResult<usize> {
    execution
        .plan
        .next_index(
            execution.last_step_run.as_deref(),
            execution.branch_target.as_deref(),
        )
        .ok_or_else(|| {
            tracing::error!(
                "[Coordinator] {}: no step can follow '{}'",
                execution.execution_id,
                execution.last_step_run.as_deref().unwrap_or_default()
            );
            missing(&execution.execution_id)
        })
}

/// A decision may only jump forward within its own plan.
fn check_branch(execution: &WorkflowExecution, index: usize, target: &str) -> Result<(), String> {
    match execution.plan.position(target) {
        Some(t) if t > index => Ok(()),
        Some(_) => Err(format!(
            "Decision '{}' targets '{}', which does not come after it",
            execution.plan.steps[index].name, target
        )),
        None => Err(format!(
            "Decision '{}' targets unknown step '{}'",
            execution.plan.steps[index].name, target
        )),
    }
}

fn missing(execution_id: &str) -> EngineError {
    EngineError::missing_data(format!("Execution {} has no usable record", execution_id))
}
