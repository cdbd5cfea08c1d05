//! Inbound message handlers.
//!
//! One handler per topic. Returning `Ok` acknowledges the message; returning
//! `Err` leaves it for redelivery. Payloads that cannot be decoded and
//! executions whose stored data is inconsistent are logged and acknowledged,
//! since redelivering them cannot succeed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::TopicConfig;
use crate::engine::{AdvanceOutcome, ExecutionCoordinator};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::models::{
    NewExecutionRequest, StepCompletionNotice, StepScheduleException,
    StepScheduleExceptionNotice, StepScheduleRequest,
};
use crate::scheduler::{ExceptionNotifier, StepScheduler};
use crate::transport::{Envelope, MessageBus, MessageHandler};

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Option<T> {
    match serde_json::from_value(envelope.payload.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::error!(
                "[Handler] Dropping undecodable message on '{}' (key '{}'): {}",
                envelope.topic,
                envelope.key,
                e
            );
            None
        }
    }
}

/// Acknowledge inconsistent executions instead of retrying them.
fn settle(execution_id: &str, result: EngineResult<()>) -> EngineResult<()> {
    match result {
        Err(e) if e.is(ErrorKind::MissingExecutionData) => {
            tracing::error!(
                "[Handler] {}: left for operator intervention: {}",
                execution_id,
                e
            );
            Ok(())
        }
        other => other,
    }
}

// ─── Orchestrator side ──────────────────────────────────────────────────

pub struct NewExecutionHandler {
    coordinator: Arc<ExecutionCoordinator>,
}

#[async_trait]
impl MessageHandler for NewExecutionHandler {
    async fn handle(&self, envelope: &Envelope) -> EngineResult<()> {
        let Some(request) = decode::<NewExecutionRequest>(envelope) else {
            return Ok(());
        };
        let id = request.execution_id.clone();
        let result = self.coordinator.start_execution(request).await.map(|outcome| {
            tracing::info!(
                "[Handler] {}: start alreadyRun={} couldRun={}",
                id,
                outcome.already_run,
                outcome.could_run
            );
        });
        settle(&id, result)
    }
}

pub struct StepCompletionHandler {
    coordinator: Arc<ExecutionCoordinator>,
}

#[async_trait]
impl MessageHandler for StepCompletionHandler {
    async fn handle(&self, envelope: &Envelope) -> EngineResult<()> {
        let Some(notice) = decode::<StepCompletionNotice>(envelope) else {
            return Ok(());
        };
        let result = match self.coordinator.on_step_completion(&notice).await {
            Ok(AdvanceOutcome::Rejected { step, reason }) => Err(EngineError::transport(format!(
                "Step '{}' of {} could not be queued: {}",
                step, notice.execution_id, reason
            ))),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        settle(&notice.execution_id, result)
    }
}

pub struct ScheduleExceptionHandler {
    coordinator: Arc<ExecutionCoordinator>,
}

#[async_trait]
impl MessageHandler for ScheduleExceptionHandler {
    async fn handle(&self, envelope: &Envelope) -> EngineResult<()> {
        let Some(notice) = decode::<StepScheduleExceptionNotice>(envelope) else {
            return Ok(());
        };
        self.coordinator
            .handle_schedule_exception(&notice)
            .await
            .map(|_| ())
    }
}

// ─── Scheduler side ─────────────────────────────────────────────────────

pub struct StepScheduleHandler {
    scheduler: Arc<StepScheduler>,
    notifier: ExceptionNotifier,
}

#[async_trait]
impl MessageHandler for StepScheduleHandler {
    async fn handle(&self, envelope: &Envelope) -> EngineResult<()> {
        let Some(request) = decode::<StepScheduleRequest>(envelope) else {
            return Ok(());
        };
        if let Err(e) = self.scheduler.schedule_step(&request).await {
            let reason = e
                .kind
                .schedule_exception()
                .unwrap_or(StepScheduleException::TaskError);
            tracing::warn!(
                "[Handler] {}: step '{}' failed to schedule ({}): {}",
                request.workflow_execution_id,
                request.name,
                reason.as_str(),
                e
            );
            self.notifier.notify(&request, reason).await?;
        }
        Ok(())
    }
}

/// Subscribe all four handlers to their topics.
pub async fn register(
    bus: &MessageBus,
    topics: &TopicConfig,
    coordinator: Arc<ExecutionCoordinator>,
    scheduler: Arc<StepScheduler>,
    notifier: ExceptionNotifier,
) {
    bus.subscribe(
        &topics.executions,
        Arc::new(NewExecutionHandler {
            coordinator: coordinator.clone(),
        }),
    )
    .await;
    bus.subscribe(
        &topics.step_answers,
        Arc::new(StepCompletionHandler {
            coordinator: coordinator.clone(),
        }),
    )
    .await;
    bus.subscribe(
        &topics.step_errors,
        Arc::new(ScheduleExceptionHandler { coordinator }),
    )
    .await;
    bus.subscribe(
        &topics.step_schedule,
        Arc::new(StepScheduleHandler {
            scheduler,
            notifier,
        }),
    )
    .await;
}
