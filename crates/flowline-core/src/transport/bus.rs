//! MessageBus — in-process topic transport with at-least-once delivery.
//!
//! Features:
//!   - One handler per topic
//!   - Messages with the same topic and key are delivered one at a time, in
//!     publish order; different keys are delivered concurrently
//!   - A handler error leaves the message unacknowledged and it is redelivered
//!   - Messages exhausting their redeliveries are kept as dead letters
//!   - Messages published before a topic has a handler wait until it subscribes

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};

use crate::error::EngineResult;

/// A keyed JSON message on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    #[serde(default)]
    pub key: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
        }
    }
}

/// Consumer of one topic. Returning `Ok` acknowledges the message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> EngineResult<()>;
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub attempts: u32,
    pub error: String,
}

/// (topic, key)
type Lane = (String, String);

struct BusInner {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    pending: HashMap<String, Vec<Envelope>>,
    /// Lanes with a running worker and the messages queued behind it.
    lanes: HashMap<Lane, VecDeque<Envelope>>,
    dead_letters: Vec<DeadLetter>,
}

struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<RwLock<BusInner>>,
    in_flight: Arc<InFlight>,
    max_redeliveries: u32,
    retry_backoff: Duration,
}

impl MessageBus {
    pub fn new(max_redeliveries: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BusInner {
                handlers: HashMap::new(),
                pending: HashMap::new(),
                lanes: HashMap::new(),
                dead_letters: Vec::new(),
            })),
            in_flight: Arc::new(InFlight {
                count: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            max_redeliveries,
            retry_backoff: Duration::from_millis(50),
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Register the handler for `topic` and deliver anything already waiting on it.
    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) {
        let (waiting, starts) = {
            let mut inner = self.inner.write().await;
            if inner
                .handlers
                .insert(topic.to_string(), handler.clone())
                .is_some()
            {
                tracing::warn!("[Bus] Replaced handler for topic '{}'", topic);
            }
            let waiting = inner.pending.remove(topic).unwrap_or_default();
            let count = waiting.len();
            let starts: Vec<Envelope> = waiting
                .into_iter()
                .filter_map(|envelope| self.enqueue(&mut inner, envelope))
                .collect();
            (count, starts)
        };
        tracing::info!(
            "[Bus] Subscribed to '{}' ({} waiting message(s))",
            topic,
            waiting
        );
        for envelope in starts {
            self.spawn_lane(handler.clone(), envelope);
        }
    }

    pub async fn publish(&self, envelope: Envelope) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        let Some(handler) = inner.handlers.get(&envelope.topic).cloned() else {
            tracing::debug!(
                "[Bus] No handler for '{}' yet, holding message {}",
                envelope.topic,
                envelope.key
            );
            inner
                .pending
                .entry(envelope.topic.clone())
                .or_default()
                .push(envelope);
            return Ok(());
        };
        let start = self.enqueue(&mut inner, envelope);
        drop(inner);
        if let Some(envelope) = start {
            self.spawn_lane(handler, envelope);
        }
        Ok(())
    }

    /// Wait until no delivery is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.read().await.dead_letters.clone()
    }

    pub async fn pending(&self, topic: &str) -> usize {
        self.inner
            .read()
            .await
            .pending
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Queue `envelope` behind its lane. Returns it when the lane was idle
    /// and a worker has to be started for it.
    fn enqueue(&self, inner: &mut BusInner, envelope: Envelope) -> Option<Envelope> {
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        let lane = (envelope.topic.clone(), envelope.key.clone());
        match inner.lanes.get_mut(&lane) {
            Some(queue) => {
                queue.push_back(envelope);
                None
            }
            None => {
                inner.lanes.insert(lane, VecDeque::new());
                Some(envelope)
            }
        }
    }

    /// Deliver `first`, then everything queued on its lane, one at a time.
    fn spawn_lane(&self, handler: Arc<dyn MessageHandler>, first: Envelope) {
        let bus = self.clone();
        tokio::spawn(async move {
            let lane = (first.topic.clone(), first.key.clone());
            let mut next = Some(first);
            while let Some(envelope) = next {
                bus.deliver(handler.clone(), envelope).await;
                next = {
                    let mut inner = bus.inner.write().await;
                    let queued = inner.lanes.get_mut(&lane).and_then(VecDeque::pop_front);
                    if queued.is_none() {
                        inner.lanes.remove(&lane);
                    }
                    queued
                };
                if bus.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                    bus.in_flight.idle.notify_waiters();
                }
            }
        });
    }

    async fn deliver(&self, handler: Arc<dyn MessageHandler>, envelope: Envelope) {
        let mut attempt: u32 = 1;
        loop {
            match handler.handle(&envelope).await {
                Ok(()) => return,
                Err(e) if attempt > self.max_redeliveries => {
                    tracing::error!(
                        "[Bus] Giving up on {} '{}' after {} attempt(s): {}",
                        envelope.topic,
                        envelope.key,
                        attempt,
                        e
                    );
                    self.inner.write().await.dead_letters.push(DeadLetter {
                        envelope,
                        attempts: attempt,
                        error: e.to_string(),
                    });
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        "[Bus] {} '{}' not acknowledged (attempt {}): {}",
                        envelope.topic,
                        envelope.key,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}
