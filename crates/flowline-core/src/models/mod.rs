pub mod execution;
pub mod messages;
pub mod plan;
pub mod task;

/// Input arguments and resolved step arguments are scalars or arrays.
pub type InputValue = serde_json::Value;

pub use execution::{ExecutionStatus, ExecutionSteps, WorkflowExecution};
pub use messages::{
    NewExecutionRequest, StepCompletionNotice, StepScheduleException,
    StepScheduleExceptionNotice, StepScheduleRequest, TaskAgentRequest,
};
pub use plan::{Param, ParamSource, Plan, Step, StepKind};
pub use task::{TaskMetadata, TransportConfig};
