//! `flowline execution` — Start, inspect and repair workflow executions.

use flowline_core::models::NewExecutionRequest;
use flowline_core::Engine;

use super::{outcome_json, print_json, to_json};

/// Parse an execution request, assigning a fresh execution id when the
/// document does not carry one.
pub fn prepare_request(mut value: serde_json::Value) -> Result<NewExecutionRequest, String> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| "Execution request must be a JSON object".to_string())?;
    let has_id = obj
        .get("executionId")
        .and_then(|v| v.as_str())
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !has_id {
        obj.insert(
            "executionId".to_string(),
            serde_json::json!(uuid::Uuid::new_v4().to_string()),
        );
    }
    serde_json::from_value(value).map_err(|e| format!("Invalid execution request: {}", e))
}

pub async fn start(engine: &Engine, file: &str) -> Result<(), String> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| format!("Failed to read '{}': {}", file, e))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{}': {}", file, e))?;
    let request = prepare_request(value)?;
    let execution_id = request.execution_id.clone();

    let outcome = engine
        .coordinator
        .start_execution(request)
        .await
        .map_err(|e| e.to_string())?;
    engine.shutdown().await;

    let mut out = to_json(&outcome)?;
    out["executionId"] = serde_json::json!(execution_id);
    print_json(&out);
    Ok(())
}

pub async fn get(engine: &Engine, execution_id: &str) -> Result<(), String> {
    let execution = engine
        .query
        .get_execution(execution_id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&to_json(&execution)?);
    Ok(())
}

pub async fn list(engine: &Engine, name: Option<&str>) -> Result<(), String> {
    let ids = engine
        .query
        .list_execution_ids(name)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "executions": ids }));
    Ok(())
}

pub async fn answers(engine: &Engine, execution_id: &str) -> Result<(), String> {
    let answers = engine
        .query
        .get_answers(execution_id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({
        "executionId": execution_id,
        "answers": answers,
    }));
    Ok(())
}

pub async fn step(engine: &Engine, execution_id: &str, index: usize) -> Result<(), String> {
    let step = engine
        .query
        .get_step_data(execution_id, index)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&to_json(&step)?);
    Ok(())
}

pub async fn fail(engine: &Engine, execution_id: &str, reason: &str) -> Result<(), String> {
    let execution = engine
        .coordinator
        .mark_error(execution_id, reason)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({
        "executionId": execution.execution_id,
        "status": execution.status,
        "errorReason": execution.error_reason,
    }));
    Ok(())
}

pub async fn resume(engine: &Engine, execution_id: &str) -> Result<(), String> {
    let outcome = engine
        .coordinator
        .resume(execution_id)
        .await
        .map_err(|e| e.to_string())?;
    engine.shutdown().await;
    print_json(&outcome_json(execution_id, &outcome));
    Ok(())
}
