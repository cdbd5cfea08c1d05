//! Integration tests for the flowline-cli commands.
//!
//! These tests run the command functions against an in-memory SQLite
//! database and a temporary output volume. The engine is not started, so
//! dispatched steps stay pending on the scheduler topic instead of reaching
//! the task service.

use std::sync::Arc;

use flowline_cli::commands::{execution, step};
use flowline_core::models::ExecutionStatus;
use flowline_core::{Database, Engine, EngineConfig, EngineInner};

fn test_engine() -> (Engine, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = EngineConfig {
        db_path: ":memory:".to_string(),
        output_root: dir.path().join("answers"),
        ..EngineConfig::default()
    };
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    let engine: Engine = Arc::new(EngineInner::new(db, config));
    (engine, dir)
}

fn write_request(dir: &tempfile::TempDir, body: serde_json::Value) -> String {
    let path = dir.path().join("request.json");
    std::fs::write(&path, body.to_string()).expect("Failed to write request file");
    path.to_string_lossy().to_string()
}

fn shout_plan(id: &str) -> serde_json::Value {
    serde_json::json!({
        "executionId": id,
        "name": "shout",
        "plan": {"steps": [
            {"name": "step1", "task": "echo", "params": [
                {"name": "text", "type": "string", "value": "hi there", "constant": true}
            ]},
            {"name": "step2", "task": "upper", "params": [
                {"name": "argument_to_upper", "type": "string", "from": "step1"}
            ]}
        ]}
    })
}

#[tokio::test]
async fn test_execution_start_from_file() {
    let (engine, dir) = test_engine();
    let file = write_request(&dir, shout_plan("cli-1"));

    execution::start(&engine, &file).await.expect("start");

    let exec = engine.query.get_execution("cli-1").await.unwrap();
    assert_eq!(exec.status, ExecutionStatus::StepScheduled);
    assert_eq!(
        engine
            .bus
            .pending(&engine.config.topics.step_schedule)
            .await,
        1
    );
    assert_eq!(
        engine.query.list_execution_ids(Some("shout")).await.unwrap(),
        vec!["cli-1".to_string()]
    );
}

#[tokio::test]
async fn test_execution_start_assigns_id() {
    let (engine, dir) = test_engine();
    let mut body = shout_plan("ignored");
    body.as_object_mut().unwrap().remove("executionId");
    let file = write_request(&dir, body);

    execution::start(&engine, &file).await.expect("start");

    let ids = engine.query.list_execution_ids(None).await.unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].len(), 36);
}

#[tokio::test]
async fn test_execution_start_missing_file() {
    let (engine, dir) = test_engine();
    let missing = dir.path().join("nope.json");
    let err = execution::start(&engine, &missing.to_string_lossy())
        .await
        .unwrap_err();
    assert!(err.contains("Failed to read"));
}

#[tokio::test]
async fn test_step_complete_finishes_execution() {
    let (engine, dir) = test_engine();
    let file = write_request(&dir, shout_plan("cli-2"));
    execution::start(&engine, &file).await.expect("start");

    step::complete(&engine, "cli-2", "step1", Some("hi there\n"), None)
        .await
        .expect("complete");

    let exec = engine.query.get_execution("cli-2").await.unwrap();
    assert_eq!(exec.status, ExecutionStatus::ExecutionFinished);
    let answers = engine.query.get_answers("cli-2").await.unwrap();
    assert_eq!(answers["step1"], "hi there");
    assert_eq!(answers["step2"], "HI THERE");

    // Inspection commands succeed on a finished execution.
    execution::get(&engine, "cli-2").await.expect("get");
    execution::answers(&engine, "cli-2").await.expect("answers");
    execution::step(&engine, "cli-2", 1).await.expect("step");
    assert!(execution::step(&engine, "cli-2", 5).await.is_err());
}

#[tokio::test]
async fn test_step_complete_requires_answer_or_locator() {
    let (engine, dir) = test_engine();
    let file = write_request(&dir, shout_plan("cli-3"));
    execution::start(&engine, &file).await.expect("start");

    let err = step::complete(&engine, "cli-3", "step1", None, None)
        .await
        .unwrap_err();
    assert!(err.contains("--answer"));
    assert_eq!(
        engine.query.get_execution("cli-3").await.unwrap().status,
        ExecutionStatus::StepScheduled
    );
}

#[tokio::test]
async fn test_fail_then_resume_is_halted() {
    let (engine, dir) = test_engine();
    let file = write_request(&dir, shout_plan("cli-4"));
    execution::start(&engine, &file).await.expect("start");

    execution::fail(&engine, "cli-4", "TASK_ERROR")
        .await
        .expect("fail");
    let exec = engine.query.get_execution("cli-4").await.unwrap();
    assert_eq!(exec.status, ExecutionStatus::Error);
    assert_eq!(exec.error_reason.as_deref(), Some("TASK_ERROR"));

    execution::resume(&engine, "cli-4").await.expect("resume");
    assert_eq!(
        engine.query.get_execution("cli-4").await.unwrap().status,
        ExecutionStatus::Error
    );
}

#[tokio::test]
async fn test_unknown_execution_is_an_error() {
    let (engine, _dir) = test_engine();
    assert!(execution::get(&engine, "ghost").await.is_err());
    assert!(execution::answers(&engine, "ghost").await.is_err());
    assert!(execution::fail(&engine, "ghost", "TASK_ERROR").await.is_err());
}
