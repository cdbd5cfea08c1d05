//! Task agent connections over a Kafka REST proxy.
//!
//! connect:  GET  {broker}/topics/{topic}
//! send:     POST {broker}/topics/{topic}
//!           Content-Type: application/vnd.kafka.json.v2+json
//!           { "records": [ { "key": "<executionId>-<step>", "value": TaskAgentRequest } ] }
//!
//! Brokers are tried in order; the first one that answers wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::models::TaskAgentRequest;
use crate::scheduler::{ConnectionConfig, TaskAgentConnection, TaskAgentConnector};

const KAFKA_JSON: &str = "application/vnd.kafka.json.v2+json";

pub struct RestProxyConnection {
    client: reqwest::Client,
    config: ConnectionConfig,
    connected: AtomicBool,
}

impl RestProxyConnection {
    pub fn new(config: ConnectionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(format!("flowline/{}", config.client_id))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config,
            connected: AtomicBool::new(false),
        }
    }

    fn topic_url(&self, broker: &str) -> String {
        let base = if broker.starts_with("http://") || broker.starts_with("https://") {
            broker.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", broker.trim_end_matches('/'))
        };
        format!("{}/topics/{}", base, self.config.transport.topic)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let t = &self.config.transport;
        if t.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&t.username, Some(&t.password))
        }
    }

    fn no_brokers(&self) -> EngineError {
        EngineError::transport(format!(
            "No brokers configured for topic '{}'",
            self.config.transport.topic
        ))
    }
}

#[async_trait]
impl TaskAgentConnection for RestProxyConnection {
    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> EngineResult<()> {
        let mut last_error = self.no_brokers();
        for broker in &self.config.transport.brokers {
            let url = self.topic_url(broker);
            match self.authorize(self.client.get(&url)).send().await {
                Ok(resp) if resp.status().is_success() => {
                    self.connected.store(true, Ordering::SeqCst);
                    tracing::info!("[RestProxy] Connected to {}", url);
                    return Ok(());
                }
                Ok(resp) => {
                    last_error = EngineError::transport(format!(
                        "{} answered {}",
                        url,
                        resp.status()
                    ));
                }
                Err(e) => last_error = e.into(),
            }
        }
        Err(last_error)
    }

    async fn disconnect(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, key: &str, request: &TaskAgentRequest) -> EngineResult<()> {
        let body = serde_json::json!({
            "records": [{ "key": key, "value": request }]
        });

        let mut last_error = self.no_brokers();
        for broker in &self.config.transport.brokers {
            let url = self.topic_url(broker);
            let result = self
                .authorize(self.client.post(&url))
                .header("content-type", KAFKA_JSON)
                .json(&body)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    last_error =
                        EngineError::transport(format!("{} answered {}: {}", url, status, text));
                }
                Err(e) => last_error = e.into(),
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        Err(last_error)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestProxyConnector;

impl TaskAgentConnector for RestProxyConnector {
    fn create(&self, config: ConnectionConfig) -> Arc<dyn TaskAgentConnection> {
        Arc::new(RestProxyConnection::new(config))
    }
}
