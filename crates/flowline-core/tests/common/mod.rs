//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use flowline_core::engine::{QueueReceipt, StepDispatchQueue};
use flowline_core::models::{
    NewExecutionRequest, StepScheduleRequest, TaskAgentRequest, TaskMetadata, TransportConfig,
};
use flowline_core::scheduler::{
    ConnectionConfig, TaskAgentConnection, TaskAgentConnector, TaskMetadataLookup,
};
use flowline_core::EngineResult;

/// Dispatch queue that records every request.
pub struct RecordingQueue {
    accept: AtomicBool,
    requests: Mutex<Vec<StepScheduleRequest>>,
}

impl RecordingQueue {
    pub fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept: AtomicBool::new(accept),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<StepScheduleRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.name).collect()
    }
}

#[async_trait]
impl StepDispatchQueue for RecordingQueue {
    async fn enqueue(&self, request: &StepScheduleRequest) -> QueueReceipt {
        if !self.accept.load(Ordering::SeqCst) {
            return QueueReceipt::rejected("queue closed");
        }
        self.requests.lock().unwrap().push(request.clone());
        QueueReceipt::queued()
    }
}

/// Task service backed by a map.
#[derive(Default)]
pub struct MapLookup {
    tasks: HashMap<String, TaskMetadata>,
}

impl MapLookup {
    pub fn with(mut self, name: &str, params: &[&str]) -> Self {
        self.tasks.insert(
            name.to_string(),
            TaskMetadata {
                transport: TransportConfig {
                    brokers: vec!["rest-proxy:8082".to_string()],
                    username: String::new(),
                    password: String::new(),
                    topic: format!("{}-requests", name),
                },
                params: params
                    .iter()
                    .map(|p| (p.to_string(), "string".to_string()))
                    .collect(),
                optional_params: Vec::new(),
            },
        );
        self
    }
}

#[async_trait]
impl TaskMetadataLookup for MapLookup {
    async fn get(&self, task_name: &str) -> EngineResult<Option<TaskMetadata>> {
        Ok(self.tasks.get(task_name).cloned())
    }
}

/// Connector whose connections record what they send.
#[derive(Default)]
pub struct RecordingConnector {
    pub created: AtomicUsize,
    pub sent: Arc<Mutex<Vec<(String, TaskAgentRequest)>>>,
}

impl RecordingConnector {
    pub fn sent(&self) -> Vec<(String, TaskAgentRequest)> {
        self.sent.lock().unwrap().clone()
    }
}

struct RecordingConnection {
    config: ConnectionConfig,
    connected: AtomicBool,
    sent: Arc<Mutex<Vec<(String, TaskAgentRequest)>>>,
}

#[async_trait]
impl TaskAgentConnection for RecordingConnection {
    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> EngineResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, key: &str, request: &TaskAgentRequest) -> EngineResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((key.to_string(), request.clone()));
        Ok(())
    }
}

impl TaskAgentConnector for RecordingConnector {
    fn create(&self, config: ConnectionConfig) -> Arc<dyn TaskAgentConnection> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(RecordingConnection {
            config,
            connected: AtomicBool::new(false),
            sent: self.sent.clone(),
        })
    }
}

pub fn request(value: serde_json::Value) -> NewExecutionRequest {
    serde_json::from_value(value).expect("valid execution request")
}
