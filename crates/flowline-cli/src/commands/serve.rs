//! `flowline serve` — Run the engine against envelopes read from stdin.
//!
//! Each stdin line is one JSON envelope:
//!
//!   {"topic": "workflow-executions", "key": "run-1", "payload": {...}}
//!
//! Envelopes are published on the in-process message bus, where the
//! coordinator, scheduler and exception handlers consume them exactly as
//! they would consume broker topics. The command drains in-flight work and
//! exits on end of input or Ctrl-C.

use flowline_core::transport::Envelope;
use flowline_core::Engine;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Parse one NDJSON line. Blank lines yield `None`.
pub fn parse_envelope(line: &str) -> Result<Option<Envelope>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let envelope: Envelope =
        serde_json::from_str(trimmed).map_err(|e| format!("Invalid envelope: {}", e))?;
    if envelope.topic.trim().is_empty() {
        return Err("Invalid envelope: empty topic".to_string());
    }
    Ok(Some(envelope))
}

pub async fn run(engine: &Engine) -> Result<(), String> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    tracing::info!("[Serve] Reading envelopes from stdin");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[Serve] Interrupted");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("[Serve] Failed to read stdin: {}", e);
                break;
            }
        };

        match parse_envelope(&line) {
            Ok(Some(envelope)) => {
                tracing::debug!("[Serve] {} <- {}", envelope.topic, envelope.key);
                engine
                    .bus
                    .publish(envelope)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("[Serve] Skipping line: {}", e),
        }
    }

    engine.shutdown().await;

    let dead = engine.bus.dead_letters().await;
    if !dead.is_empty() {
        tracing::warn!("[Serve] {} message(s) dead-lettered", dead.len());
        for letter in &dead {
            tracing::warn!(
                "[Serve]   {} / {} after {} attempt(s): {}",
                letter.envelope.topic,
                letter.envelope.key,
                letter.attempts,
                letter.error
            );
        }
    }
    Ok(())
}
