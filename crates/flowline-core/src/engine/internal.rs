//! InternalStepExecutor — pseudo-tasks evaluated inside the coordinator.
//!
//! - `decision`: compare `left` and `right` under `condition` and pick the
//!   step named by `success` or `failure`.
//! - `upper` / `lower`: case-transform `argument_to_upper` / `argument_to_lower`.
//!
//! Evaluation is pure; persisting results and continuing the plan is the
//! coordinator's job.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::models::{InputValue, Step, StepKind};

/// Result for non-string input to a case transform.
pub const NON_STRING_PLACEHOLDER: &str = "Nadaaa";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Equals,
    Greater,
    Smaller,
}

impl Condition {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "equals" => Some(Self::Equals),
            "greater" => Some(Self::Greater),
            "smaller" => Some(Self::Smaller),
            _ => None,
        }
    }

    pub fn evaluate(&self, left: &InputValue, right: &InputValue) -> bool {
        let ordering = compare(left, right);
        match self {
            Self::Equals => ordering == Some(Ordering::Equal),
            Self::Greater => ordering == Some(Ordering::Greater),
            Self::Smaller => ordering == Some(Ordering::Less),
        }
    }
}

/// Numbers (or numeric strings) compare numerically, everything else as text.
fn compare(left: &InputValue, right: &InputValue) -> Option<Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => Some(as_text(left).cmp(&as_text(right))),
    }
}

fn as_number(value: &InputValue) -> Option<f64> {
    match value {
        InputValue::Number(n) => n.as_f64(),
        InputValue::String(s) => s.trim().parse::<f64>().ok(),
        InputValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &InputValue) -> String {
    match value {
        InputValue::String(s) => s.clone(),
        InputValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalOutcome {
    /// Text to persist as the step's output.
    Output(String),
    /// Name of the step the plan continues with.
    Branch(String),
}

#[derive(Debug, Clone, Default)]
pub struct InternalStepExecutor;

impl InternalStepExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(
        &self,
        step: &Step,
        args: &HashMap<String, InputValue>,
    ) -> EngineResult<InternalOutcome> {
        match step.kind() {
            StepKind::Decision => self.decide(step, args).map(InternalOutcome::Branch),
            StepKind::Upper => Ok(InternalOutcome::Output(transform(
                args.get("argument_to_upper"),
                str::to_uppercase,
            ))),
            StepKind::Lower => Ok(InternalOutcome::Output(transform(
                args.get("argument_to_lower"),
                str::to_lowercase,
            ))),
            StepKind::External(task) => Err(EngineError::invalid(format!(
                "Step '{}' runs external task '{}' and cannot be executed in-process",
                step.name, task
            ))),
        }
    }

    fn decide(&self, step: &Step, args: &HashMap<String, InputValue>) -> EngineResult<String> {
        let condition = args
            .get("condition")
            .and_then(InputValue::as_str)
            .and_then(Condition::from_str)
            .ok_or_else(|| {
                EngineError::invalid(format!(
                    "Decision '{}' has no valid condition (expected equals, greater or smaller)",
                    step.name
                ))
            })?;

        let null = InputValue::Null;
        let left = args.get("left").unwrap_or(&null);
        let right = args.get("right").unwrap_or(&null);
        let branch = if condition.evaluate(left, right) {
            "success"
        } else {
            "failure"
        };

        args.get(branch)
            .and_then(InputValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::invalid(format!(
                    "Decision '{}' selected '{}' but names no target step",
                    step.name, branch
                ))
            })
    }
}

fn transform(value: Option<&InputValue>, f: fn(&str) -> String) -> String {
    match value {
        Some(InputValue::String(s)) => f(s),
        _ => NON_STRING_PLACEHOLDER.to_string(),
    }
}
