//! ParameterResolver — assembles a step's concrete arguments.
//!
//! Each parameter draws from one of three sources: a literal constant, a key
//! into the execution's input arguments, or the trimmed output of an earlier
//! step read back through the `OutputStore`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{InputValue, ParamSource, Step, WorkflowExecution};
use crate::store::OutputStore;

#[derive(Clone)]
pub struct ParameterResolver {
    outputs: Arc<dyn OutputStore>,
}

impl ParameterResolver {
    pub fn new(outputs: Arc<dyn OutputStore>) -> Self {
        Self { outputs }
    }

    pub async fn resolve(
        &self,
        step: &Step,
        execution: &WorkflowExecution,
    ) -> HashMap<String, InputValue> {
        let mut args = HashMap::with_capacity(step.params.len());
        for param in &step.params {
            match param.source() {
                ParamSource::Constant(value) => {
                    args.insert(param.name.clone(), value.clone());
                }
                ParamSource::Input(key) => match execution.input_arguments.get(key) {
                    Some(value) => {
                        args.insert(param.name.clone(), value.clone());
                    }
                    None => tracing::warn!(
                        "[Resolver] {}: input argument '{}' for param '{}' of step '{}' is missing",
                        execution.execution_id,
                        key,
                        param.name,
                        step.name
                    ),
                },
                ParamSource::From(source_step) => {
                    let text = self.read_output(execution, source_step).await;
                    args.insert(param.name.clone(), InputValue::String(text));
                }
                ParamSource::Unset => tracing::warn!(
                    "[Resolver] {}: param '{}' of step '{}' has neither 'from' nor 'value'",
                    execution.execution_id,
                    param.name,
                    step.name
                ),
            }
        }
        args
    }

    /// Trimmed output of `source_step`. Unreadable outputs resolve to "".
    async fn read_output(&self, execution: &WorkflowExecution, source_step: &str) -> String {
        let Some(locator) = execution.outputs.get(source_step) else {
            tracing::warn!(
                "[Resolver] {}: no output recorded for step '{}', using empty value",
                execution.execution_id,
                source_step
            );
            return String::new();
        };

        match self.outputs.read(locator).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Err(e) => {
                tracing::warn!(
                    "[Resolver] {}: failed to read output of step '{}' at '{}': {}; using empty value",
                    execution.execution_id,
                    source_step,
                    locator,
                    e
                );
                String::new()
            }
        }
    }
}
