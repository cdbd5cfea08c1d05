//! Task metadata lookups against the task service.

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::models::TaskMetadata;

/// Resolves a task name to its parameter contract and routing info.
#[async_trait]
pub trait TaskMetadataLookup: Send + Sync {
    async fn get(&self, task_name: &str) -> EngineResult<Option<TaskMetadata>>;
}

/// `GET {base_url}/{path}/{taskName}` on the task service.
pub struct HttpTaskMetadataLookup {
    client: reqwest::Client,
    base_url: String,
    path: String,
}

impl HttpTaskMetadataLookup {
    pub fn new(base_url: &str, path: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            path: path.trim_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, task_name: &str) -> String {
        if self.path.is_empty() {
            format!("{}/{}", self.base_url, task_name)
        } else {
            format!("{}/{}/{}", self.base_url, self.path, task_name)
        }
    }
}

#[async_trait]
impl TaskMetadataLookup for HttpTaskMetadataLookup {
    async fn get(&self, task_name: &str) -> EngineResult<Option<TaskMetadata>> {
        let url = self.url_for(task_name);
        tracing::debug!("[TaskLookup] GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::transport(format!(
                "Task service returned {} for '{}': {}",
                status, task_name, body
            )));
        }

        let text = response.text().await?;
        if text.trim().is_empty() || text.trim() == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}
