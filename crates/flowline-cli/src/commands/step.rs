//! `flowline step` — Report step results on behalf of a task agent.

use flowline_core::models::StepCompletionNotice;
use flowline_core::store::OutputStore;
use flowline_core::Engine;

use super::{outcome_json, print_json};

/// Record a step answer and advance the execution.
///
/// Either `answer` is written to the output volume first, or `locator`
/// points at an answer a task agent already wrote there.
pub async fn complete(
    engine: &Engine,
    execution_id: &str,
    step_name: &str,
    answer: Option<&str>,
    locator: Option<&str>,
) -> Result<(), String> {
    let output_locator = match (answer, locator) {
        (Some(text), _) => engine
            .outputs
            .write(execution_id, step_name, text.as_bytes())
            .await
            .map_err(|e| e.to_string())?,
        (None, Some(locator)) => locator.to_string(),
        (None, None) => return Err("Either --answer or --locator is required".to_string()),
    };

    let notice = StepCompletionNotice {
        execution_id: execution_id.to_string(),
        output_locator,
        step_name: step_name.to_string(),
    };
    let outcome = engine
        .coordinator
        .on_step_completion(&notice)
        .await
        .map_err(|e| e.to_string())?;
    engine.shutdown().await;

    print_json(&outcome_json(execution_id, &outcome));
    Ok(())
}
