//! Engine configuration.
//!
//! Values come from the environment (see `EngineConfig::from_env`) or from
//! the CLI, which exposes the same variables through clap `env` arguments.

use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "FLOWLINE_DB_PATH";
pub const ENV_OUTPUT_ROOT: &str = "FLOWLINE_OUTPUT_ROOT";
pub const ENV_NFS_PATH: &str = "NFS_PATH";
pub const ENV_TASK_SERVICE_URL: &str = "TASK_SERVICE_URL";
pub const ENV_TASK_AGENTS_PATH: &str = "TASK_SERVICE_TASK_AGENTS_PATH";
pub const ENV_TOPIC_EXECUTIONS: &str = "FLOWLINE_TOPIC_EXECUTIONS";
pub const ENV_TOPIC_STEP_SCHEDULE: &str = "FLOWLINE_TOPIC_STEP_SCHEDULE";
pub const ENV_TOPIC_STEP_ANSWERS: &str = "FLOWLINE_TOPIC_STEP_ANSWERS";
pub const ENV_TOPIC_STEP_ERRORS: &str = "FLOWLINE_TOPIC_STEP_ERRORS";
pub const ENV_CLIENT_ID: &str = "FLOWLINE_CLIENT_ID";
pub const ENV_MAX_REDELIVERIES: &str = "FLOWLINE_MAX_REDELIVERIES";

/// Topic names for the four inbound message contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub executions: String,
    pub step_schedule: String,
    pub step_answers: String,
    pub step_errors: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            executions: "workflow-executions".to_string(),
            step_schedule: "step-schedule-requests".to_string(),
            step_answers: "step-answers".to_string(),
            step_errors: "step-schedule-exceptions".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub db_path: String,
    /// Root of the shared output volume.
    pub output_root: PathBuf,
    pub task_service_url: String,
    pub task_agents_path: String,
    pub topics: TopicConfig,
    /// Client id presented by task agent connections.
    pub client_id: String,
    /// Redeliveries of an unacknowledged message before it is dead-lettered.
    pub max_redeliveries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "flowline.db".to_string(),
            output_root: PathBuf::from("answers"),
            task_service_url: "http://task-service:3000".to_string(),
            task_agents_path: "task-agents".to_string(),
            topics: TopicConfig::default(),
            client_id: "scheduler".to_string(),
            max_redeliveries: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get(ENV_DB_PATH) {
            cfg.db_path = v;
        }
        if let Some(v) = get(ENV_OUTPUT_ROOT).or_else(|| get(ENV_NFS_PATH)) {
            cfg.output_root = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_TASK_SERVICE_URL) {
            cfg.task_service_url = v;
        }
        if let Some(v) = get(ENV_TASK_AGENTS_PATH) {
            cfg.task_agents_path = v;
        }
        if let Some(v) = get(ENV_TOPIC_EXECUTIONS) {
            cfg.topics.executions = v;
        }
        if let Some(v) = get(ENV_TOPIC_STEP_SCHEDULE) {
            cfg.topics.step_schedule = v;
        }
        if let Some(v) = get(ENV_TOPIC_STEP_ANSWERS) {
            cfg.topics.step_answers = v;
        }
        if let Some(v) = get(ENV_TOPIC_STEP_ERRORS) {
            cfg.topics.step_errors = v;
        }
        if let Some(v) = get(ENV_CLIENT_ID) {
            cfg.client_id = v;
        }
        if let Some(v) = get(ENV_MAX_REDELIVERIES) {
            match v.trim().parse() {
                Ok(n) => cfg.max_redeliveries = n,
                Err(_) => tracing::warn!(
                    "[Config] Ignoring {}='{}': not a number",
                    ENV_MAX_REDELIVERIES,
                    v
                ),
            }
        }
        cfg
    }
}
