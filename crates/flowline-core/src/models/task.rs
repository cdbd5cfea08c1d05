//! Task contracts as published by the task service.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Routing info for a task agent's topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(deserialize_with = "brokers_list")]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub topic: String,
}

/// Task description returned by the task service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    #[serde(rename = "kafka", alias = "transport")]
    pub transport: TransportConfig,
    /// Parameter name → declared type (`string`, `number`, `boolean`, optionally `[]`).
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub optional_params: Vec<String>,
}

impl TaskMetadata {
    pub fn declares(&self, param: &str) -> bool {
        self.params.contains_key(param)
    }

    /// Declared parameters that are not listed as optional.
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .keys()
            .map(String::as_str)
            .filter(|p| !self.optional_params.iter().any(|o| o == p))
    }
}

/// Brokers arrive either as a comma-separated string or as a list.
fn brokers_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Brokers {
        Joined(String),
        List(Vec<String>),
    }

    let list = match Brokers::deserialize(deserializer)? {
        Brokers::Joined(s) => s.split(',').map(|b| b.trim().to_string()).collect(),
        Brokers::List(v) => v,
    };
    Ok(list.into_iter().filter(|b| !b.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_data_from_task_service() {
        let meta: TaskMetadata = serde_json::from_value(json!({
            "kafka": {
                "brokers": "kafka-1:9092, kafka-2:9092",
                "username": "svc",
                "password": "secret",
                "topic": "echo-requests"
            },
            "params": {"text": "string", "times": "number"},
            "optionalParams": ["times"]
        }))
        .unwrap();

        assert_eq!(meta.transport.brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
        assert!(meta.declares("text"));
        assert!(!meta.declares("other"));
        let required: Vec<&str> = meta.required_params().collect();
        assert_eq!(required, vec!["text"]);
    }

    #[test]
    fn test_brokers_as_list() {
        let cfg: TransportConfig = serde_json::from_value(json!({
            "brokers": ["a:1", "b:2"],
            "topic": "t"
        }))
        .unwrap();
        assert_eq!(cfg.brokers.len(), 2);
        assert_eq!(cfg.username, "");
    }
}
