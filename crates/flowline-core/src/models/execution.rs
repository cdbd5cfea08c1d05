use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::messages::NewExecutionRequest;
use super::plan::{Plan, Step};
use super::InputValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Persisted,
    Taken,
    StepScheduled,
    StepFinished,
    ExecutionFinished,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persisted => "PERSISTED",
            Self::Taken => "TAKEN",
            Self::StepScheduled => "STEP_SCHEDULED",
            Self::StepFinished => "STEP_FINISHED",
            Self::ExecutionFinished => "EXECUTION_FINISHED",
            Self::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PERSISTED" => Some(Self::Persisted),
            "TAKEN" => Some(Self::Taken),
            "STEP_SCHEDULED" => Some(Self::StepScheduled),
            "STEP_FINISHED" => Some(Self::StepFinished),
            "EXECUTION_FINISHED" => Some(Self::ExecutionFinished),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExecutionFinished | Self::Error)
    }
}

/// One run of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub name: String,
    pub description: String,
    pub status: ExecutionStatus,
    pub input_params: HashMap<String, String>,
    pub input_arguments: HashMap<String, InputValue>,
    pub plan: Plan,
    /// Step name → output locator. Entries are never replaced.
    pub outputs: BTreeMap<String, String>,
    pub last_step_run: Option<String>,
    /// Step chosen by the most recent decision; the only step `lastStepRun`
    /// may jump to from that decision.
    #[serde(default)]
    pub branch_target: Option<String>,
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn from_request(req: NewExecutionRequest) -> Self {
        let now = Utc::now();
        Self {
            execution_id: req.execution_id,
            name: req.name,
            description: req.description,
            status: ExecutionStatus::Persisted,
            input_params: req.input_params,
            input_arguments: req.input_arguments,
            plan: req.plan,
            outputs: BTreeMap::new(),
            last_step_run: None,
            branch_target: None,
            error_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The slice of an execution needed to pick and resolve the next step.
#[derive(Debug, Clone)]
pub struct ExecutionSteps {
    pub steps: Vec<Step>,
    pub last_step_run: Option<String>,
    pub input_arguments: HashMap<String, InputValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_terminal() {
        for status in [
            ExecutionStatus::Persisted,
            ExecutionStatus::Taken,
            ExecutionStatus::StepScheduled,
            ExecutionStatus::StepFinished,
            ExecutionStatus::ExecutionFinished,
            ExecutionStatus::Error,
        ] {
            assert_eq!(ExecutionStatus::from_str(status.as_str()), Some(status));
        }
        assert!(ExecutionStatus::Error.is_terminal());
        assert!(ExecutionStatus::ExecutionFinished.is_terminal());
        assert!(!ExecutionStatus::StepFinished.is_terminal());
        assert_eq!(ExecutionStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_execution_serializes_camel_case() {
        let req: NewExecutionRequest = serde_json::from_value(serde_json::json!({
            "executionId": "e1",
            "name": "demo",
            "plan": {"steps": []}
        }))
        .unwrap();
        let exec = WorkflowExecution::from_request(req);
        let json = serde_json::to_value(&exec).unwrap();
        assert_eq!(json["executionId"], "e1");
        assert_eq!(json["status"], "PERSISTED");
        assert!(json["lastStepRun"].is_null());
    }
}
