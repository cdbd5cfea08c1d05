//! StepScheduler — validates a step against its task contract and hands it
//! to the task's agent.
//!
//! Checks run in order and stop at the first failure:
//! 1. the task exists in the task service (`TASK_NOT_EXISTS`)
//! 2. every argument is a declared parameter (`TASK_PARAM_NOT_EXISTS`)
//! 3. the agent pool accepted the step (`TASK_ERROR`)

use std::sync::Arc;

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::models::{StepScheduleRequest, TaskMetadata};

use super::agent_pool::TaskAgentPool;
use super::task_lookup::TaskMetadataLookup;

pub struct StepScheduler {
    lookup: Arc<dyn TaskMetadataLookup>,
    pool: TaskAgentPool,
}

impl StepScheduler {
    pub fn new(lookup: Arc<dyn TaskMetadataLookup>, pool: TaskAgentPool) -> Self {
        Self { lookup, pool }
    }

    pub fn pool(&self) -> &TaskAgentPool {
        &self.pool
    }

    /// Errors carry one of the scheduler kinds; see `ErrorKind::schedule_exception`.
    pub async fn schedule_step(&self, request: &StepScheduleRequest) -> EngineResult<()> {
        let task = self.task_info(&request.task).await?;
        validate_args(&task, request)?;
        self.pool.send(&task, request).await?;
        tracing::info!(
            "[Scheduler] {}: step '{}' handed to task '{}'",
            request.workflow_execution_id,
            request.name,
            request.task
        );
        Ok(())
    }

    async fn task_info(&self, task_name: &str) -> EngineResult<TaskMetadata> {
        match self.lookup.get(task_name).await {
            Ok(Some(task)) => Ok(task),
            Ok(None) => Err(EngineError::new(
                ErrorKind::TaskNotFound,
                format!("Task '{}' does not exist", task_name),
            )),
            Err(e) => {
                tracing::warn!("[Scheduler] Task lookup for '{}' failed: {}", task_name, e);
                Err(EngineError::with_cause(
                    ErrorKind::TaskNotFound,
                    format!("Task '{}' could not be looked up", task_name),
                    e,
                ))
            }
        }
    }
}

/// Only unknown arguments are rejected; missing required ones are not checked.
fn validate_args(task: &TaskMetadata, request: &StepScheduleRequest) -> EngineResult<()> {
    let mut unknown: Vec<&str> = request
        .input_args
        .keys()
        .map(String::as_str)
        .filter(|k| !task.declares(k))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    Err(EngineError::new(
        ErrorKind::TaskParamNotExists,
        format!(
            "Task '{}' does not declare parameter(s): {}",
            request.task,
            unknown.join(", ")
        ),
    ))
}
