//! Read side of the execution store: lookups used by operators and clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::models::{Step, WorkflowExecution};
use crate::store::{ExecutionStore, OutputStore};

#[derive(Clone)]
pub struct ExecutionQuery {
    store: Arc<dyn ExecutionStore>,
    outputs: Arc<dyn OutputStore>,
}

impl ExecutionQuery {
    pub fn new(store: Arc<dyn ExecutionStore>, outputs: Arc<dyn OutputStore>) -> Self {
        Self { store, outputs }
    }

    pub async fn get_execution(&self, execution_id: &str) -> EngineResult<WorkflowExecution> {
        self.store
            .get_by_id(execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Execution {} not found", execution_id)))
    }

    pub async fn get_step_data(&self, execution_id: &str, index: usize) -> EngineResult<Step> {
        let steps = self
            .store
            .get_steps(execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("Execution {} not found", execution_id)))?;
        steps.steps.into_iter().nth(index).ok_or_else(|| {
            EngineError::not_found(format!(
                "Execution {} has no step at index {}",
                execution_id, index
            ))
        })
    }

    pub async fn list_execution_ids(&self, name: Option<&str>) -> EngineResult<Vec<String>> {
        match name {
            Some(name) => self.store.list_ids_by_name(name).await,
            None => self.store.list_ids().await,
        }
    }

    /// Trimmed output content of every step that has answered, by step name.
    pub async fn get_answers(&self, execution_id: &str) -> EngineResult<BTreeMap<String, String>> {
        let execution = self.get_execution(execution_id).await?;
        let mut answers = BTreeMap::new();
        for (step, locator) in &execution.outputs {
            let bytes = self.outputs.read(locator).await.map_err(|e| {
                EngineError::with_cause(
                    crate::error::ErrorKind::OutputRead,
                    format!("Answer of step '{}' is unreadable", step),
                    e,
                )
            })?;
            answers.insert(step.clone(), String::from_utf8_lossy(&bytes).trim().to_string());
        }
        Ok(answers)
    }
}
