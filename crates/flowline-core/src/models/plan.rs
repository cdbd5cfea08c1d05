//! Workflow plan: an ordered list of steps with typed parameters.

use serde::{Deserialize, Serialize};

use super::InputValue;

/// Task names handled inside the coordinator.
pub const TASK_DECISION: &str = "decision";
pub const TASK_UPPER: &str = "upper";
pub const TASK_LOWER: &str = "lower";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub task: String,
    #[serde(default)]
    pub params: Vec<Param>,
}

impl Step {
    pub fn kind(&self) -> StepKind {
        StepKind::from_task(&self.task)
    }
}

/// A step parameter. Exactly one of `from` or `value` is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<InputValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<bool>,
}

/// Where a parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamSource<'a> {
    /// Trimmed output of an earlier step.
    From(&'a str),
    /// Literal value.
    Constant(&'a InputValue),
    /// Key into the execution's input arguments.
    Input(&'a str),
    /// Neither `from` nor `value` was given.
    Unset,
}

impl Param {
    pub fn source(&self) -> ParamSource<'_> {
        if let Some(from) = self.from.as_deref() {
            return ParamSource::From(from);
        }
        match &self.value {
            Some(value) if self.constant.unwrap_or(false) => ParamSource::Constant(value),
            Some(InputValue::String(key)) => ParamSource::Input(key),
            // A non-string lookup key cannot name an input argument; treat it as a literal.
            Some(value) => ParamSource::Constant(value),
            None => ParamSource::Unset,
        }
    }
}

/// Closed set of step kinds the coordinator distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Decision,
    Upper,
    Lower,
    External(String),
}

impl StepKind {
    pub fn from_task(task: &str) -> Self {
        match task {
            TASK_DECISION => Self::Decision,
            TASK_UPPER => Self::Upper,
            TASK_LOWER => Self::Lower,
            other => Self::External(other.to_string()),
        }
    }
}

impl Plan {
    pub fn position(&self, step_name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == step_name)
    }

    /// Index of the only step allowed to run after `last_run`: the first step
    /// when nothing has run, the chosen target after a decision, otherwise the
    /// following step. The index equals `steps.len()` once the plan is done.
    ///
    /// Returns `None` if `last_run` is not a step of this plan, or if it is a
    /// decision without a target later in the plan.
    pub fn next_index(
        &self,
        last_run: Option<&str>,
        branch_target: Option<&str>,
    ) -> Option<usize> {
        let Some(last) = last_run else {
            return Some(0);
        };
        let position = self.position(last)?;
        if self.steps[position].kind() != StepKind::Decision {
            return Some(position + 1);
        }
        let target = self.position(branch_target?)?;
        (target > position).then_some(target)
    }
}
