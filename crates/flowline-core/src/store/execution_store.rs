use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::models::{ExecutionStatus, ExecutionSteps, Plan, WorkflowExecution};

use super::{ExecutionStore, RecordedOutput};

const SELECT_COLUMNS: &str = "SELECT execution_id, name, description, status, input_params, \
     input_arguments, plan, outputs, last_step_run, error_reason, created_at, updated_at, \
     branch_target FROM workflow_executions";

#[derive(Clone)]
pub struct SqliteExecutionStore {
    db: Database,
}

impl SqliteExecutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn load(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<WorkflowExecution>> {
    conn.query_row(
        &format!("{} WHERE execution_id = ?1", SELECT_COLUMNS),
        rusqlite::params![id],
        |row| Ok(row_to_execution(row)),
    )
    .optional()
}

fn to_json<T: serde::Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn create_if_absent(&self, execution: &WorkflowExecution) -> EngineResult<bool> {
        let e = execution.clone();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO workflow_executions (execution_id, name, description, \
                     status, input_params, input_arguments, plan, outputs, last_step_run, \
                     error_reason, created_at, updated_at, branch_target) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    rusqlite::params![
                        e.execution_id,
                        e.name,
                        e.description,
                        e.status.as_str(),
                        to_json(&e.input_params)?,
                        to_json(&e.input_arguments)?,
                        to_json(&e.plan)?,
                        to_json(&e.outputs)?,
                        e.last_step_run,
                        e.error_reason,
                        e.created_at.timestamp_millis(),
                        e.updated_at.timestamp_millis(),
                        e.branch_target,
                    ],
                )?;
                Ok(n > 0)
            })
            .await
    }

    async fn conditional_update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> EngineResult<Option<WorkflowExecution>> {
        let id = execution_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let Some(mut e) = load(conn, &id)? else {
                    return Ok(None);
                };
                if e.status == status || e.status.is_terminal() {
                    return Ok(Some(e));
                }
                let now = Utc::now();
                conn.execute(
                    "UPDATE workflow_executions SET status = ?2, updated_at = ?3 \
                     WHERE execution_id = ?1 AND status <> ?2",
                    rusqlite::params![id, status.as_str(), now.timestamp_millis()],
                )?;
                e.status = status;
                e.updated_at = now;
                Ok(Some(e))
            })
            .await
    }

    async fn get_steps(&self, execution_id: &str) -> EngineResult<Option<ExecutionSteps>> {
        Ok(self.get_by_id(execution_id).await?.map(|e| ExecutionSteps {
            steps: e.plan.steps,
            last_step_run: e.last_step_run,
            input_arguments: e.input_arguments,
        }))
    }

    async fn record_step_output(
        &self,
        execution_id: &str,
        step_name: &str,
        locator: &str,
        branch_target: Option<&str>,
    ) -> EngineResult<Option<RecordedOutput>> {
        let id = execution_id.to_string();
        let step = step_name.to_string();
        let locator = locator.to_string();
        let branch = branch_target.map(str::to_string);
        self.db
            .with_conn_async(move |conn| {
                let Some(mut e) = load(conn, &id)? else {
                    return Ok(None);
                };
                if e.outputs.contains_key(&step) {
                    return Ok(Some(RecordedOutput {
                        execution: e,
                        inserted: false,
                    }));
                }
                e.outputs.insert(step.clone(), locator);

                let next = e
                    .plan
                    .next_index(e.last_step_run.as_deref(), e.branch_target.as_deref());
                if next.is_some() && next == e.plan.position(&step) {
                    e.last_step_run = Some(step);
                    e.branch_target = branch;
                }
                e.updated_at = Utc::now();

                conn.execute(
                    "UPDATE workflow_executions SET outputs = ?2, last_step_run = ?3, \
                     branch_target = ?4, updated_at = ?5 WHERE execution_id = ?1",
                    rusqlite::params![
                        id,
                        to_json(&e.outputs)?,
                        e.last_step_run,
                        e.branch_target,
                        e.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(Some(RecordedOutput {
                    execution: e,
                    inserted: true,
                }))
            })
            .await
    }

    async fn get_by_id(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>> {
        let id = execution_id.to_string();
        self.db.with_conn_async(move |conn| load(conn, &id)).await
    }

    async fn mark_error(
        &self,
        execution_id: &str,
        reason: &str,
    ) -> EngineResult<WorkflowExecution> {
        let id = execution_id.to_string();
        let reason = reason.to_string();
        let updated = self
            .db
            .with_conn_async(move |conn| {
                let Some(mut e) = load(conn, &id)? else {
                    return Ok(None);
                };
                if e.status.is_terminal() {
                    return Ok(Some(e));
                }
                let now = Utc::now();
                conn.execute(
                    "UPDATE workflow_executions SET status = ?2, error_reason = ?3, updated_at = ?4 \
                     WHERE execution_id = ?1",
                    rusqlite::params![
                        id,
                        ExecutionStatus::Error.as_str(),
                        reason,
                        now.timestamp_millis()
                    ],
                )?;
                e.status = ExecutionStatus::Error;
                e.error_reason = Some(reason);
                e.updated_at = now;
                Ok(Some(e))
            })
            .await?;
        updated.ok_or_else(|| {
            EngineError::not_found(format!("Execution {} not found", execution_id))
        })
    }

    async fn list_ids(&self) -> EngineResult<Vec<String>> {
        self.db
            .with_conn_async(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT execution_id FROM workflow_executions ORDER BY created_at ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn list_ids_by_name(&self, name: &str) -> EngineResult<Vec<String>> {
        let name = name.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT execution_id FROM workflow_executions WHERE name = ?1 \
                     ORDER BY created_at ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![name], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn delete(&self, execution_id: &str) -> EngineResult<bool> {
        let id = execution_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute(
                    "DELETE FROM workflow_executions WHERE execution_id = ?1",
                    rusqlite::params![id],
                )?;
                Ok(n > 0)
            })
            .await
    }
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> WorkflowExecution {
    use chrono::TimeZone;
    let to_dt = |ms: Option<i64>| {
        ms.and_then(|v| Utc.timestamp_millis_opt(v).single())
            .unwrap_or_else(Utc::now)
    };
    let json_col = |idx: usize| row.get::<_, String>(idx).unwrap_or_default();

    let status: String = row.get(3).unwrap_or_default();
    WorkflowExecution {
        execution_id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        description: row.get(2).unwrap_or_default(),
        status: ExecutionStatus::from_str(&status).unwrap_or(ExecutionStatus::Persisted),
        input_params: serde_json::from_str::<HashMap<String, String>>(&json_col(4))
            .unwrap_or_default(),
        input_arguments: serde_json::from_str(&json_col(5)).unwrap_or_default(),
        plan: serde_json::from_str::<Plan>(&json_col(6)).unwrap_or_default(),
        outputs: serde_json::from_str::<BTreeMap<String, String>>(&json_col(7))
            .unwrap_or_default(),
        last_step_run: row.get(8).unwrap_or(None),
        branch_target: row.get(12).unwrap_or(None),
        error_reason: row.get(9).unwrap_or(None),
        created_at: to_dt(row.get(10).ok()),
        updated_at: to_dt(row.get(11).ok()),
    }
}
