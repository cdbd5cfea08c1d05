//! Workflow execution engine.
//!
//! ```text
//!  NewExecutionRequest ──► ExecutionCoordinator::start_execution
//!                               │
//!  StepCompletionNotice ──► save_step_answer + advance ◄──┐
//!                               │                          │
//!                  ParameterResolver (const / input / from)│
//!                               │                          │
//!                 internal step? ── yes ── InternalStepExecutor
//!                               │ no
//!                               ▼
//!                       StepDispatchQueue ──► scheduler
//! ```

pub mod coordinator;
pub mod internal;
pub mod query;
pub mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::StepScheduleRequest;

pub use coordinator::{AdvanceOutcome, ExecutionCoordinator, StartOutcome};
pub use internal::{Condition, InternalOutcome, InternalStepExecutor};
pub use query::ExecutionQuery;
pub use resolver::ParameterResolver;

/// Acknowledgement from the outbound step queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReceipt {
    pub queued: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueReceipt {
    pub fn queued() -> Self {
        Self {
            queued: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            queued: false,
            error: Some(error.into()),
        }
    }
}

/// Outbound transport handing steps to the scheduler.
#[async_trait]
pub trait StepDispatchQueue: Send + Sync {
    async fn enqueue(&self, request: &StepScheduleRequest) -> QueueReceipt;
}
