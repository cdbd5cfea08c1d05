//! TaskAgentPool — one outbound connection per task name.
//!
//! A cached connection is reused while the task's routing info is unchanged
//! and replaced as soon as the task service reports different brokers,
//! credentials or topic. Connecting happens lazily before each send.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::models::{StepScheduleRequest, TaskAgentRequest, TaskMetadata, TransportConfig};

/// Binding for one task agent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub transport: TransportConfig,
    pub client_id: String,
}

/// Outbound channel to a task agent.
#[async_trait]
pub trait TaskAgentConnection: Send + Sync {
    fn config(&self) -> &ConnectionConfig;

    fn is_connected(&self) -> bool;

    async fn connect(&self) -> EngineResult<()>;

    async fn disconnect(&self) -> EngineResult<()>;

    async fn send(&self, key: &str, request: &TaskAgentRequest) -> EngineResult<()>;
}

/// Builds connections for the pool.
pub trait TaskAgentConnector: Send + Sync {
    fn create(&self, config: ConnectionConfig) -> Arc<dyn TaskAgentConnection>;
}

struct PoolInner {
    connections: HashMap<String, Arc<dyn TaskAgentConnection>>,
}

#[derive(Clone)]
pub struct TaskAgentPool {
    inner: Arc<RwLock<PoolInner>>,
    connector: Arc<dyn TaskAgentConnector>,
    client_id: String,
}

impl TaskAgentPool {
    pub fn new(connector: Arc<dyn TaskAgentConnector>, client_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PoolInner {
                connections: HashMap::new(),
            })),
            connector,
            client_id: client_id.into(),
        }
    }

    /// Send a step to its task agent, keyed `<executionId>-<stepName>`.
    pub async fn send(&self, task: &TaskMetadata, request: &StepScheduleRequest) -> EngineResult<()> {
        let connection = self.connection_for(&request.task, &task.transport).await;
        let key = request.dispatch_key();

        let result: EngineResult<()> = async {
            if !connection.is_connected() {
                connection.connect().await?;
            }
            connection.send(&key, &TaskAgentRequest::from(request)).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    "[AgentPool] Sent {} to task '{}' on topic '{}'",
                    key,
                    request.task,
                    task.transport.topic
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "[AgentPool] Failed to send {} to task '{}': {}",
                    key,
                    request.task,
                    e
                );
                Err(EngineError::with_cause(
                    ErrorKind::TaskDispatchError,
                    format!("Could not hand step {} to task '{}'", key, request.task),
                    e,
                ))
            }
        }
    }

    /// Disconnect every cached connection. Errors are logged, never returned.
    pub async fn shutdown(&self) {
        let connections: Vec<(String, Arc<dyn TaskAgentConnection>)> = {
            let inner = self.inner.read().await;
            inner
                .connections
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        for (task, connection) in connections {
            if !connection.is_connected() {
                continue;
            }
            match connection.disconnect().await {
                Ok(()) => tracing::info!("[AgentPool] Disconnected task '{}'", task),
                Err(e) => tracing::warn!("[AgentPool] Disconnect of task '{}' failed: {}", task, e),
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn connection_for(
        &self,
        task_name: &str,
        transport: &TransportConfig,
    ) -> Arc<dyn TaskAgentConnection> {
        {
            let inner = self.inner.read().await;
            if let Some(existing) = inner.connections.get(task_name) {
                if &existing.config().transport == transport {
                    return existing.clone();
                }
            }
        }

        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.connections.get(task_name) {
            if &existing.config().transport == transport {
                return existing.clone();
            }
            // TODO: disconnect the replaced connection once in-flight sends on it can be drained.
            tracing::info!(
                "[AgentPool] Routing for task '{}' changed, creating a new connection",
                task_name
            );
        }

        let connection = self.connector.create(ConnectionConfig {
            transport: transport.clone(),
            client_id: self.client_id.clone(),
        });
        inner
            .connections
            .insert(task_name.to_string(), connection.clone());
        connection
    }
}
