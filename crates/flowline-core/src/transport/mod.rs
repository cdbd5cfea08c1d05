//! Message transports.
//!
//! - `bus`: in-process topics with at-least-once redelivery
//! - `rest_proxy`: outbound task agent connections over HTTP
//!
//! The bus adapters below bind the engine's outbound contracts
//! (`StepDispatchQueue`, `ErrorChannel`) to bus topics.

pub mod bus;
pub mod rest_proxy;

use async_trait::async_trait;

use crate::engine::{QueueReceipt, StepDispatchQueue};
use crate::error::EngineResult;
use crate::models::{StepScheduleExceptionNotice, StepScheduleRequest};
use crate::scheduler::ErrorChannel;

pub use bus::{DeadLetter, Envelope, MessageBus, MessageHandler};
pub use rest_proxy::{RestProxyConnection, RestProxyConnector};

/// Publishes step schedule requests on the scheduler's topic.
#[derive(Clone)]
pub struct BusDispatchQueue {
    bus: MessageBus,
    topic: String,
}

impl BusDispatchQueue {
    pub fn new(bus: MessageBus, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl StepDispatchQueue for BusDispatchQueue {
    async fn enqueue(&self, request: &StepScheduleRequest) -> QueueReceipt {
        let payload = match serde_json::to_value(request) {
            Ok(v) => v,
            Err(e) => return QueueReceipt::rejected(e.to_string()),
        };
        match self
            .bus
            .publish(Envelope::new(&self.topic, request.dispatch_key(), payload))
            .await
        {
            Ok(()) => QueueReceipt::queued(),
            Err(e) => QueueReceipt::rejected(e.to_string()),
        }
    }
}

/// Publishes schedule exception notices on the coordinator's error topic.
#[derive(Clone)]
pub struct BusErrorChannel {
    bus: MessageBus,
    topic: String,
}

impl BusErrorChannel {
    pub fn new(bus: MessageBus, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl ErrorChannel for BusErrorChannel {
    async fn publish(&self, notice: &StepScheduleExceptionNotice) -> EngineResult<()> {
        let payload = serde_json::to_value(notice)?;
        self.bus
            .publish(Envelope::new(&self.topic, &notice.execution_id, payload))
            .await
    }
}
