//! SQLite database layer for the execution store.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{EngineError, EngineResult, ErrorKind};

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> EngineResult<Self> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).map_err(|e| {
            EngineError::with_cause(ErrorKind::StorageUnavailable, "Failed to open database", e)
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| {
                EngineError::with_cause(ErrorKind::StorageUnavailable, "Failed to set pragmas", e)
            })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            EngineError::with_cause(ErrorKind::StorageUnavailable, "Failed to open in-memory db", e)
        })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngineError::storage(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(EngineError::from)
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| EngineError::storage(format!("Task join error: {}", e)))?
    }

    fn initialize_tables(&self) -> EngineResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS workflow_executions (
                    execution_id    TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    description     TEXT NOT NULL DEFAULT '',
                    status          TEXT NOT NULL DEFAULT 'PERSISTED',
                    input_params    TEXT NOT NULL DEFAULT '{}',
                    input_arguments TEXT NOT NULL DEFAULT '{}',
                    plan            TEXT NOT NULL,
                    outputs         TEXT NOT NULL DEFAULT '{}',
                    last_step_run   TEXT,
                    branch_target   TEXT,
                    error_reason    TEXT,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_workflow_executions_name ON workflow_executions(name);
                ",
            )
        })?;
        self.run_migrations()
    }

    /// Apply incremental migrations for schema changes on existing databases.
    fn run_migrations(&self) -> EngineResult<()> {
        self.with_conn(|conn| {
            // Ignore the error when the column is already present.
            let _ = conn.execute(
                "ALTER TABLE workflow_executions ADD COLUMN branch_target TEXT",
                [],
            );
            Ok(())
        })
    }
}
