//! Integration tests for the execution state machine.
//!
//! These drive `ExecutionCoordinator` against an in-memory SQLite store,
//! a temporary output directory and a recording dispatch queue.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{request, RecordingQueue};
use flowline_core::engine::{AdvanceOutcome, ExecutionCoordinator, ExecutionQuery};
use flowline_core::models::{ExecutionStatus, StepCompletionNotice, StepScheduleExceptionNotice};
use flowline_core::store::{ExecutionStore, FsOutputStore, OutputStore, SqliteExecutionStore};
use flowline_core::{Database, EngineResult, ErrorKind};

struct Harness {
    coordinator: ExecutionCoordinator,
    query: ExecutionQuery,
    store: Arc<SqliteExecutionStore>,
    outputs: Arc<FsOutputStore>,
    queue: Arc<RecordingQueue>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteExecutionStore::new(
        Database::open_in_memory().expect("in-memory db"),
    ));
    let outputs = Arc::new(FsOutputStore::new(dir.path()));
    let queue = RecordingQueue::new(true);
    Harness {
        coordinator: ExecutionCoordinator::new(store.clone(), outputs.clone(), queue.clone()),
        query: ExecutionQuery::new(store.clone(), outputs.clone()),
        store,
        outputs,
        queue,
        _dir: dir,
    }
}

impl Harness {
    /// Play the task agent: write the answer and report completion.
    async fn complete(&self, execution_id: &str, step: &str, answer: &str) -> AdvanceOutcome {
        self.try_complete(execution_id, step, answer).await.unwrap()
    }

    async fn try_complete(
        &self,
        execution_id: &str,
        step: &str,
        answer: &str,
    ) -> EngineResult<AdvanceOutcome> {
        let locator = self
            .outputs
            .write(execution_id, step, answer.as_bytes())
            .await
            .unwrap();
        self.coordinator
            .on_step_completion(&StepCompletionNotice {
                execution_id: execution_id.to_string(),
                output_locator: locator,
                step_name: step.to_string(),
            })
            .await
    }

    async fn status(&self, execution_id: &str) -> ExecutionStatus {
        self.store.get_by_id(execution_id).await.unwrap().unwrap().status
    }
}

fn echo_then_upper(id: &str) -> serde_json::Value {
    json!({
        "executionId": id,
        "name": "shout",
        "description": "echo a phrase and upper-case it",
        "plan": {"steps": [
            {"name": "step1", "task": "echo", "params": [
                {"name": "text", "type": "string", "value": "hello world", "constant": true}
            ]},
            {"name": "step2", "task": "upper", "params": [
                {"name": "argument_to_upper", "type": "string", "from": "step1"}
            ]}
        ]}
    })
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let h = harness();

    let first = h
        .coordinator
        .start_execution(request(echo_then_upper("e1")))
        .await
        .unwrap();
    assert!(!first.already_run);
    assert!(first.could_run);

    let second = h
        .coordinator
        .start_execution(request(echo_then_upper("e1")))
        .await
        .unwrap();
    assert!(second.already_run);
    assert!(!second.could_run);

    assert_eq!(h.queue.requests().len(), 1);
    assert_eq!(h.store.list_ids().await.unwrap(), vec!["e1".to_string()]);
    assert_eq!(h.status("e1").await, ExecutionStatus::StepScheduled);
}

#[tokio::test]
async fn test_first_step_dispatch_carries_resolved_args() {
    let h = harness();
    h.coordinator
        .start_execution(request(json!({
            "executionId": "e2",
            "name": "greet",
            "inputArguments": {"who": "Ada"},
            "plan": {"steps": [
                {"name": "hello", "task": "greeter", "params": [
                    {"name": "name", "type": "string", "value": "who"},
                    {"name": "polite", "type": "boolean", "value": true, "constant": true}
                ]}
            ]}
        })))
        .await
        .unwrap();

    let requests = h.queue.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].workflow_execution_id, "e2");
    assert_eq!(requests[0].task, "greeter");
    assert_eq!(requests[0].input_args["name"], json!("Ada"));
    assert_eq!(requests[0].input_args["polite"], json!(true));
}

#[tokio::test]
async fn test_internal_step_chains_to_finish_without_dispatch() {
    let h = harness();
    h.coordinator
        .start_execution(request(echo_then_upper("e3")))
        .await
        .unwrap();
    assert_eq!(h.queue.names(), vec!["step1"]);

    let outcome = h.complete("e3", "step1", "hello world\n").await;
    assert_eq!(outcome, AdvanceOutcome::Finished);

    assert_eq!(h.queue.names(), vec!["step1"]);
    assert_eq!(h.status("e3").await, ExecutionStatus::ExecutionFinished);

    let answers = h.query.get_answers("e3").await.unwrap();
    assert_eq!(answers["step1"], "hello world");
    assert_eq!(answers["step2"], "HELLO WORLD");
}

#[tokio::test]
async fn test_param_resolves_from_prior_output() {
    let h = harness();
    h.coordinator
        .start_execution(request(json!({
            "executionId": "e4",
            "name": "pipe",
            "plan": {"steps": [
                {"name": "stepA", "task": "echo", "params": [
                    {"name": "text", "type": "string", "value": "x", "constant": true}
                ]},
                {"name": "stepB", "task": "echo", "params": [
                    {"name": "param", "type": "string", "from": "stepA"}
                ]}
            ]}
        })))
        .await
        .unwrap();

    let outcome = h.complete("e4", "stepA", "  42 \n").await;
    assert_eq!(
        outcome,
        AdvanceOutcome::Dispatched {
            step: "stepB".to_string()
        }
    );
    let requests = h.queue.requests();
    assert_eq!(requests[1].name, "stepB");
    assert_eq!(requests[1].input_args["param"], json!("42"));
}

fn scored(id: &str, score: i64) -> serde_json::Value {
    json!({
        "executionId": id,
        "name": "grading",
        "inputArguments": {"score": score},
        "plan": {"steps": [
            {"name": "check", "task": "decision", "params": [
                {"name": "condition", "type": "string", "value": "greater", "constant": true},
                {"name": "left", "type": "number", "value": "score"},
                {"name": "right", "type": "number", "value": 5, "constant": true},
                {"name": "success", "type": "string", "value": "celebrate", "constant": true},
                {"name": "failure", "type": "string", "value": "console", "constant": true}
            ]},
            {"name": "console", "task": "notify", "params": []},
            {"name": "celebrate", "task": "notify", "params": []}
        ]}
    })
}

#[tokio::test]
async fn test_decision_routes_to_success_branch() {
    let h = harness();
    let started = h
        .coordinator
        .start_execution(request(scored("e5", 10)))
        .await
        .unwrap();
    assert!(started.could_run);
    assert_eq!(h.queue.names(), vec!["celebrate"]);

    let exec = h.store.get_by_id("e5").await.unwrap().unwrap();
    assert_eq!(exec.last_step_run.as_deref(), Some("check"));
    assert_eq!(exec.status, ExecutionStatus::StepScheduled);

    let outcome = h.complete("e5", "celebrate", "party").await;
    assert_eq!(outcome, AdvanceOutcome::Finished);
    assert_eq!(h.status("e5").await, ExecutionStatus::ExecutionFinished);
}

#[tokio::test]
async fn test_decision_routes_to_failure_branch() {
    let h = harness();
    h.coordinator
        .start_execution(request(scored("e6", 1)))
        .await
        .unwrap();
    assert_eq!(h.queue.names(), vec!["console"]);
    let answers = h.query.get_answers("e6").await.unwrap();
    assert_eq!(answers["check"], "console");
}

#[tokio::test]
async fn test_decision_backwards_target_marks_error() {
    let h = harness();
    let started = h
        .coordinator
        .start_execution(request(json!({
            "executionId": "e7",
            "name": "loop",
            "plan": {"steps": [
                {"name": "first", "task": "lower", "params": [
                    {"name": "argument_to_lower", "type": "string", "value": "ABC", "constant": true}
                ]},
                {"name": "check", "task": "decision", "params": [
                    {"name": "condition", "type": "string", "value": "equals", "constant": true},
                    {"name": "left", "type": "string", "from": "first"},
                    {"name": "right", "type": "string", "value": "abc", "constant": true},
                    {"name": "success", "type": "string", "value": "first", "constant": true},
                    {"name": "failure", "type": "string", "value": "first", "constant": true}
                ]}
            ]}
        })))
        .await
        .unwrap();
    assert!(!started.could_run);
    assert!(h.queue.requests().is_empty());

    let exec = h.store.get_by_id("e7").await.unwrap().unwrap();
    assert_eq!(exec.status, ExecutionStatus::Error);
    assert!(exec.error_reason.unwrap().contains("does not come after"));
}

#[tokio::test]
async fn test_rejected_dispatch_keeps_record_and_can_resume() {
    let h = harness();
    h.queue.set_accept(false);
    let started = h
        .coordinator
        .start_execution(request(echo_then_upper("e8")))
        .await
        .unwrap();
    assert!(!started.already_run);
    assert!(!started.could_run);
    assert_eq!(h.status("e8").await, ExecutionStatus::Taken);

    h.queue.set_accept(true);
    let resumed = h.coordinator.resume("e8").await.unwrap();
    assert_eq!(
        resumed,
        AdvanceOutcome::Dispatched {
            step: "step1".to_string()
        }
    );
    assert_eq!(h.status("e8").await, ExecutionStatus::StepScheduled);
}

#[tokio::test]
async fn test_redelivered_completion_does_not_redispatch() {
    let h = harness();
    h.coordinator
        .start_execution(request(json!({
            "executionId": "e9",
            "name": "two-external",
            "plan": {"steps": [
                {"name": "a", "task": "echo", "params": []},
                {"name": "b", "task": "echo", "params": []}
            ]}
        })))
        .await
        .unwrap();

    let first = h.complete("e9", "a", "one").await;
    assert_eq!(first, AdvanceOutcome::Dispatched { step: "b".into() });

    let again = h.complete("e9", "a", "one").await;
    assert_eq!(again, AdvanceOutcome::AlreadyAdvanced);
    assert_eq!(h.queue.names(), vec!["a", "b"]);
    assert_eq!(h.status("e9").await, ExecutionStatus::StepScheduled);
}

#[tokio::test]
async fn test_schedule_exception_marks_error_and_stops() {
    let h = harness();
    h.coordinator
        .start_execution(request(echo_then_upper("e10")))
        .await
        .unwrap();

    let exec = h
        .coordinator
        .handle_schedule_exception(&StepScheduleExceptionNotice {
            execution_id: "e10".into(),
            reason: "TASK_NOT_EXISTS".into(),
        })
        .await
        .unwrap();
    assert_eq!(exec.status, ExecutionStatus::Error);
    assert_eq!(exec.error_reason.as_deref(), Some("TASK_NOT_EXISTS"));

    let late = h.complete("e10", "step1", "too late").await;
    assert_eq!(late, AdvanceOutcome::Halted(ExecutionStatus::Error));
}

#[tokio::test]
async fn test_mark_error_for_unknown_execution_is_raised() {
    let h = harness();
    let err = h
        .coordinator
        .mark_error("ghost", "TASK_ERROR")
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_missing_from_output_resolves_empty() {
    let h = harness();
    h.coordinator
        .start_execution(request(echo_then_upper("e11")))
        .await
        .unwrap();

    // Report a locator that was never written.
    let outcome = h
        .coordinator
        .on_step_completion(&StepCompletionNotice {
            execution_id: "e11".into(),
            output_locator: "e11/nowhere".into(),
            step_name: "step1".into(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, AdvanceOutcome::Finished);

    let step2 = h.outputs.read("e11/step2").await.unwrap();
    assert_eq!(step2, b"");
}

fn three_external(id: &str) -> serde_json::Value {
    json!({
        "executionId": id,
        "name": "three-external",
        "plan": {"steps": [
            {"name": "a", "task": "echo", "params": []},
            {"name": "b", "task": "echo", "params": []},
            {"name": "c", "task": "echo", "params": []}
        ]}
    })
}

#[tokio::test]
async fn test_completion_for_unknown_step_is_refused() {
    let h = harness();
    h.coordinator
        .start_execution(request(three_external("e12")))
        .await
        .unwrap();

    let err = h.try_complete("e12", "zzz", "stray").await.unwrap_err();
    assert!(err.is(ErrorKind::MissingExecutionData));

    let exec = h.store.get_by_id("e12").await.unwrap().unwrap();
    assert!(exec.outputs.is_empty());
    assert_eq!(exec.last_step_run, None);
    assert_eq!(exec.status, ExecutionStatus::StepScheduled);
    assert_eq!(h.queue.names(), vec!["a"]);
}

#[tokio::test]
async fn test_out_of_order_completion_is_refused() {
    let h = harness();
    h.coordinator
        .start_execution(request(three_external("e13")))
        .await
        .unwrap();

    for early in ["b", "c"] {
        let err = h.try_complete("e13", early, "early").await.unwrap_err();
        assert!(err.is(ErrorKind::MissingExecutionData));
    }
    assert!(h.store.get_by_id("e13").await.unwrap().unwrap().outputs.is_empty());

    let outcome = h.complete("e13", "a", "one").await;
    assert_eq!(outcome, AdvanceOutcome::Dispatched { step: "b".into() });

    // `c` is still not next while `b` runs.
    let err = h.try_complete("e13", "c", "early").await.unwrap_err();
    assert!(err.is(ErrorKind::MissingExecutionData));

    let exec = h.store.get_by_id("e13").await.unwrap().unwrap();
    assert_eq!(exec.last_step_run.as_deref(), Some("a"));
    assert_eq!(exec.outputs.keys().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(h.queue.names(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_only_decision_target_completion_is_accepted() {
    let h = harness();
    h.coordinator
        .start_execution(request(scored("e14", 10)))
        .await
        .unwrap();
    assert_eq!(h.queue.names(), vec!["celebrate"]);

    // `console` follows the decision in plan order but was not chosen.
    let err = h.try_complete("e14", "console", "meh").await.unwrap_err();
    assert!(err.is(ErrorKind::MissingExecutionData));

    let outcome = h.complete("e14", "celebrate", "party").await;
    assert_eq!(outcome, AdvanceOutcome::Finished);
    let exec = h.store.get_by_id("e14").await.unwrap().unwrap();
    assert_eq!(exec.last_step_run.as_deref(), Some("celebrate"));
    assert!(!exec.outputs.contains_key("console"));
}

#[tokio::test]
async fn test_redelivered_completion_retries_rejected_dispatch() {
    let h = harness();
    h.coordinator
        .start_execution(request(three_external("e15")))
        .await
        .unwrap();

    h.queue.set_accept(false);
    let refused = h.complete("e15", "a", "one").await;
    assert!(matches!(refused, AdvanceOutcome::Rejected { ref step, .. } if step == "b"));
    assert_eq!(h.status("e15").await, ExecutionStatus::StepFinished);

    h.queue.set_accept(true);
    let retried = h.complete("e15", "a", "one").await;
    assert_eq!(retried, AdvanceOutcome::Dispatched { step: "b".into() });
    assert_eq!(h.status("e15").await, ExecutionStatus::StepScheduled);

    let again = h.complete("e15", "a", "one").await;
    assert_eq!(again, AdvanceOutcome::AlreadyAdvanced);
}
