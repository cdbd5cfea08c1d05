//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the flowline-core engine through `Engine`.

pub mod execution;
pub mod serve;
pub mod step;

use std::path::PathBuf;
use std::sync::Arc;

use flowline_core::engine::AdvanceOutcome;
use flowline_core::{Database, Engine, EngineConfig, EngineInner};

/// Options given on the command line. Anything left unset comes from the
/// environment through `EngineConfig::from_env`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub db_path: String,
    pub output_root: Option<String>,
    pub task_service_url: Option<String>,
}

impl Settings {
    pub fn engine_config(&self) -> EngineConfig {
        self.apply(EngineConfig::from_env())
    }

    fn apply(&self, mut config: EngineConfig) -> EngineConfig {
        if !self.db_path.is_empty() {
            config.db_path = self.db_path.clone();
        }
        if let Some(root) = &self.output_root {
            config.output_root = PathBuf::from(root);
        }
        if let Some(url) = &self.task_service_url {
            config.task_service_url = url.clone();
        }
        config
    }
}

/// Open the database and build a started `Engine`.
pub async fn init_engine(settings: &Settings) -> Engine {
    let config = settings.engine_config();
    let db = Database::open(&config.db_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", config.db_path, e);
        std::process::exit(1);
    });

    let engine: Engine = Arc::new(EngineInner::new(db, config));
    engine.start().await;
    engine
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Serialize any result for `print_json`.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize output: {}", e))
}

/// JSON view of where an advance stopped.
pub fn outcome_json(execution_id: &str, outcome: &AdvanceOutcome) -> serde_json::Value {
    let (result, detail) = match outcome {
        AdvanceOutcome::Dispatched { step } => ("dispatched", serde_json::json!({ "step": step })),
        AdvanceOutcome::Rejected { step, reason } => (
            "rejected",
            serde_json::json!({ "step": step, "reason": reason }),
        ),
        AdvanceOutcome::Finished => ("finished", serde_json::json!({})),
        AdvanceOutcome::Halted(status) => ("halted", serde_json::json!({ "status": status })),
        AdvanceOutcome::AlreadyAdvanced => ("alreadyAdvanced", serde_json::json!({})),
        AdvanceOutcome::Failed { reason } => ("failed", serde_json::json!({ "reason": reason })),
    };
    serde_json::json!({
        "executionId": execution_id,
        "result": result,
        "detail": detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_override_config() {
        let settings = Settings {
            db_path: "/tmp/x.db".to_string(),
            output_root: Some("/mnt/answers".to_string()),
            task_service_url: None,
        };
        let config = settings.apply(EngineConfig::default());
        assert_eq!(config.db_path, "/tmp/x.db");
        assert_eq!(config.output_root, PathBuf::from("/mnt/answers"));
        assert_eq!(config.task_service_url, "http://task-service:3000");
    }

    #[test]
    fn test_outcome_json() {
        let value = outcome_json(
            "e1",
            &AdvanceOutcome::Dispatched {
                step: "step2".to_string(),
            },
        );
        assert_eq!(value["result"], "dispatched");
        assert_eq!(value["detail"]["step"], "step2");
    }

    #[test]
    fn test_empty_db_path_keeps_config() {
        let config = Settings::default().apply(EngineConfig::default());
        assert_eq!(config.db_path, "flowline.db");
    }
}
