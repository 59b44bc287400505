//! Reasoning engine reached over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ExecutionTrace, ReasoningEngine, ReasoningRequest};
use crate::error::{DataVizError, Result};

/// Posts the request as JSON and reads the trace from the response body.
#[derive(Debug, Clone)]
pub struct HttpReasoningEngine {
    endpoint: Url,
    client: Client,
}

impl HttpReasoningEngine {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataVizError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ReasoningEngine for HttpReasoningEngine {
    async fn run(&self, request: &ReasoningRequest) -> Result<ExecutionTrace> {
        debug!("POST {}", self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DataVizError::reasoning("reasoning endpoint timed out")
                } else if e.is_connect() {
                    DataVizError::reasoning(format!("Failed to connect to {}", self.endpoint))
                } else {
                    DataVizError::reasoning(format!("reasoning request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DataVizError::reasoning(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(DataVizError::reasoning(format!(
                "reasoning endpoint returned {status}: {}",
                truncate(&body, 500)
            )));
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| DataVizError::reasoning(format!("reasoning endpoint sent invalid JSON: {e}")))?;
        ExecutionTrace::from_json(value)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BackendKind, NewConnection};
    use chrono::Utc;

    #[test]
    fn test_request_body_shape() {
        let connection = NewConnection {
            name: "n".to_string(),
            kind: "mysql".to_string(),
            host: "h".to_string(),
            port: 3306,
            database: "d".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            ssl: None,
        }
        .into_record("id".to_string(), Utc::now())
        .unwrap();
        let request = ReasoningRequest {
            question: "total?".to_string(),
            connection_uri: connection.uri(),
            backend: BackendKind::MySql,
            connection,
            table_allowlist: None,
            sample_rows_in_table_info: 3,
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["question"], "total?");
        assert_eq!(body["connection_uri"], "mysql://u:p@h:3306/d");
        assert_eq!(body["backend"], "mysql");
        assert_eq!(body["sample_rows_in_table_info"], 3);
        assert!(body.get("table_allowlist").is_none());
        assert!(body.get("connection").is_none());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_reasoning_error() {
        let engine = HttpReasoningEngine::new(
            Url::parse("http://127.0.0.1:9/agent").unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();
        let request = ReasoningRequest {
            question: "q".to_string(),
            connection: NewConnection {
                name: "n".to_string(),
                kind: "postgres".to_string(),
                host: "h".to_string(),
                port: 5432,
                database: "d".to_string(),
                username: String::new(),
                password: String::new(),
                ssl: None,
            }
            .into_record("id".to_string(), Utc::now())
            .unwrap(),
            connection_uri: "postgresql://h:5432/d".to_string(),
            backend: BackendKind::Postgres,
            table_allowlist: None,
            sample_rows_in_table_info: 3,
        };
        let err = engine.run(&request).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ReasoningEngineError);
    }
}
