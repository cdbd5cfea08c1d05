//! Storage contracts consumed by the engine and their default implementations.
//!
//! ```text
//!  ExecutionCoordinator ──► ExecutionStore  (SqliteExecutionStore)
//!          │
//!          └──────────────► OutputStore     (FsOutputStore)
//! ```
//!
//! Both contracts are order-tolerant: repeated writes degrade to no-ops so
//! redelivered messages cannot corrupt an execution.

pub mod execution_store;
pub mod output_store;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::models::{ExecutionStatus, ExecutionSteps, WorkflowExecution};

pub use execution_store::SqliteExecutionStore;
pub use output_store::FsOutputStore;

/// Outcome of [`ExecutionStore::record_step_output`].
#[derive(Debug, Clone)]
pub struct RecordedOutput {
    pub execution: WorkflowExecution,
    /// False when the step already had an output.
    pub inserted: bool,
}

/// Durable record of each execution.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert the record unless one with the same id exists. Returns whether it was created.
    async fn create_if_absent(&self, execution: &WorkflowExecution) -> EngineResult<bool>;

    /// Apply `status` only when the stored status differs and is not terminal.
    /// Returns the resulting record (unchanged on a no-op), or `None` if absent.
    async fn conditional_update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> EngineResult<Option<WorkflowExecution>>;

    async fn get_steps(&self, execution_id: &str) -> EngineResult<Option<ExecutionSteps>>;

    /// Record the output locator for a step. First write wins; a repeat
    /// returns the stored record unchanged with `inserted` false.
    ///
    /// `lastStepRun` moves to the step only when it is the plan's next step
    /// (see [`Plan::next_index`](crate::models::Plan::next_index)).
    /// `branch_target` is kept with a decision's output and names the one
    /// step allowed to follow it.
    async fn record_step_output(
        &self,
        execution_id: &str,
        step_name: &str,
        locator: &str,
        branch_target: Option<&str>,
    ) -> EngineResult<Option<RecordedOutput>>;

    async fn get_by_id(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>>;

    /// Move the execution to ERROR with a reason. Fails with `NotFound` if absent.
    async fn mark_error(&self, execution_id: &str, reason: &str)
        -> EngineResult<WorkflowExecution>;

    async fn list_ids(&self) -> EngineResult<Vec<String>>;

    async fn list_ids_by_name(&self, name: &str) -> EngineResult<Vec<String>>;

    /// Administrative removal; not used by the engine's control flow.
    async fn delete(&self, execution_id: &str) -> EngineResult<bool>;
}

/// Byte storage for step results, addressed by locator strings.
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Allocate the per-execution namespace. Idempotent.
    async fn create_namespace(&self, execution_id: &str) -> EngineResult<()>;

    /// Store a step result and return its locator.
    async fn write(&self, execution_id: &str, step_name: &str, bytes: &[u8])
        -> EngineResult<String>;

    async fn read(&self, locator: &str) -> EngineResult<Vec<u8>>;
}
