//! Inbound and outbound message contracts.
//!
//! All payloads are JSON on the wire with camelCase field names, matching
//! what the other services in the pipeline produce and consume.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::plan::Plan;
use super::InputValue;

/// Request to start a new workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExecutionRequest {
    pub execution_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Declared input parameter types (name → type).
    #[serde(default)]
    pub input_params: HashMap<String, String>,
    #[serde(default)]
    pub input_arguments: HashMap<String, InputValue>,
    pub plan: Plan,
}

/// A step handed from the coordinator to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScheduleRequest {
    pub workflow_execution_id: String,
    pub name: String,
    pub task: String,
    #[serde(default)]
    pub input_args: HashMap<String, InputValue>,
}

impl StepScheduleRequest {
    /// Partitioning key for downstream transports.
    pub fn dispatch_key(&self) -> String {
        format!("{}-{}", self.workflow_execution_id, self.name)
    }
}

/// Sent by a task agent when a step has produced its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletionNotice {
    pub execution_id: String,
    #[serde(rename = "answer", alias = "outputLocator")]
    pub output_locator: String,
    #[serde(rename = "name", alias = "stepName")]
    pub step_name: String,
}

/// Scheduler failure reported back to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScheduleExceptionNotice {
    pub execution_id: String,
    pub reason: String,
}

/// Payload published to a task agent's topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAgentRequest {
    pub name: String,
    pub workflow_execution_id: String,
    pub input_args: HashMap<String, InputValue>,
}

impl From<&StepScheduleRequest> for TaskAgentRequest {
    fn from(req: &StepScheduleRequest) -> Self {
        Self {
            name: req.name.clone(),
            workflow_execution_id: req.workflow_execution_id.clone(),
            input_args: req.input_args.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepScheduleException {
    TaskNotExists,
    TaskParamNotExists,
    TaskParamMissing,
    TaskError,
}

impl StepScheduleException {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskNotExists => "TASK_NOT_EXISTS",
            Self::TaskParamNotExists => "TASK_PARAM_NOT_EXISTS",
            Self::TaskParamMissing => "TASK_PARAM_MISSING",
            Self::TaskError => "TASK_ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TASK_NOT_EXISTS" => Some(Self::TaskNotExists),
            "TASK_PARAM_NOT_EXISTS" => Some(Self::TaskParamNotExists),
            "TASK_PARAM_MISSING" => Some(Self::TaskParamMissing),
            "TASK_ERROR" => Some(Self::TaskError),
            _ => None,
        }
    }
}
