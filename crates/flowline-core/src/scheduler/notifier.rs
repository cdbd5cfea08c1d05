//! ExceptionNotifier — reports scheduling failures to the coordinator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::models::{StepScheduleException, StepScheduleExceptionNotice, StepScheduleRequest};

/// The coordinator's inbound error channel.
#[async_trait]
pub trait ErrorChannel: Send + Sync {
    async fn publish(&self, notice: &StepScheduleExceptionNotice) -> EngineResult<()>;
}

#[derive(Clone)]
pub struct ExceptionNotifier {
    channel: Arc<dyn ErrorChannel>,
}

impl ExceptionNotifier {
    pub fn new(channel: Arc<dyn ErrorChannel>) -> Self {
        Self { channel }
    }

    /// Publish `{executionId, reason}`. A transport failure is returned to the
    /// caller, who must not acknowledge the step.
    pub async fn notify(
        &self,
        request: &StepScheduleRequest,
        reason: StepScheduleException,
    ) -> EngineResult<()> {
        let notice = StepScheduleExceptionNotice {
            execution_id: request.workflow_execution_id.clone(),
            reason: reason.as_str().to_string(),
        };
        match self.channel.publish(&notice).await {
            Ok(()) => {
                tracing::info!(
                    "[Notifier] {}: reported {} for step '{}'",
                    notice.execution_id,
                    notice.reason,
                    request.name
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "[Notifier] {}: could not report {}: {}",
                    notice.execution_id,
                    notice.reason,
                    e
                );
                Err(EngineError::with_cause(
                    ErrorKind::Transport,
                    format!("Exception notice for {} was not delivered", notice.execution_id),
                    e,
                ))
            }
        }
    }
}
