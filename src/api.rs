//! Service facade.
//!
//! The operations a transport layer calls, plus the `{status, kind, message}`
//! envelope every result is reported in.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::codec::{AesGcmCodec, EncryptionKey};
use crate::config::{Config, EngineKind};
use crate::db::{DatabaseConnector, DriverConnector};
use crate::error::{DataVizError, ErrorKind, Result};
use crate::llm::{create_client, LlmClient};
use crate::orchestrator::{Orchestrator, QueryRequest, QueryResponse};
use crate::probe::{DriverProber, ProbeReport};
use crate::reasoning::{
    HttpReasoningEngine, MockReasoningEngine, ReasoningAdapter, ReasoningEngine, SqlAgent,
};
use crate::registry::{ConnectionSummary, NewConnection, Registry, SqliteStore};
use crate::viz::ChartAdvisor;

/// Uniform result shape for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    Success { data: T },
    Error { kind: ErrorKind, message: String },
}

impl<T> Envelope<T> {
    pub fn from_result(result: Result<T>) -> Self {
        result.into()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl<T> From<Result<T>> for Envelope<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(e) => Self::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

/// Connection registry plus query pipeline.
pub struct DataViz {
    registry: Arc<Registry>,
    orchestrator: Option<Orchestrator>,
}

impl DataViz {
    /// Wires up every component from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let registry = open_registry(config).await?;
        let connector: Arc<dyn DatabaseConnector> = Arc::new(DriverConnector);

        let mut llm: Option<Arc<dyn LlmClient>> = None;
        let mut llm_client = || -> Result<Arc<dyn LlmClient>> {
            if let Some(client) = &llm {
                return Ok(client.clone());
            }
            let client: Arc<dyn LlmClient> = Arc::from(create_client(&config.llm, None)?);
            llm = Some(client.clone());
            Ok(client)
        };

        let engine: Arc<dyn ReasoningEngine> = match config.reasoning.engine {
            EngineKind::Agent => Arc::new(SqlAgent::new(
                llm_client()?,
                connector.clone(),
                config.reasoning.max_iterations,
            )),
            EngineKind::Http => Arc::new(HttpReasoningEngine::new(
                config.reasoning.endpoint_url()?,
                config.reasoning.timeout(),
            )?),
            EngineKind::Mock => Arc::new(MockReasoningEngine::new()),
        };
        info!("Reasoning engine: {}", engine.name());

        let mut orchestrator = Orchestrator::new(
            registry.clone(),
            ReasoningAdapter::new(engine, &config.reasoning),
            connector,
        );
        if config.advisor.enabled {
            orchestrator = orchestrator.with_advisor(ChartAdvisor::new(llm_client()?));
        }

        Ok(Self {
            registry,
            orchestrator: Some(orchestrator),
        })
    }

    /// Registry operations only; `run_query` is unavailable.
    pub async fn registry_from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            registry: open_registry(config).await?,
            orchestrator: None,
        })
    }

    /// Assembles a facade from prebuilt parts.
    pub fn from_parts(registry: Arc<Registry>, orchestrator: Orchestrator) -> Self {
        Self {
            registry,
            orchestrator: Some(orchestrator),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Probes and saves a connection, returning its redacted view.
    pub async fn add_connection(&self, input: NewConnection) -> Result<ConnectionSummary> {
        let id = self.registry.add(input).await?;
        self.get_connection(&id).await
    }

    /// Probes a connection without saving it.
    pub async fn verify_connection(&self, input: NewConnection) -> Result<ProbeReport> {
        self.registry.verify(input).await
    }

    pub async fn list_connections(&self) -> Result<Vec<ConnectionSummary>> {
        self.registry.list().await
    }

    /// Returns one connection without its password.
    pub async fn get_connection(&self, id: &str) -> Result<ConnectionSummary> {
        Ok(self.registry.get(id).await?.summary())
    }

    pub async fn update_connection(&self, id: &str, input: NewConnection) -> Result<ConnectionSummary> {
        self.registry.update(id, input).await?;
        self.get_connection(id).await
    }

    pub async fn remove_connection(&self, id: &str) -> Result<()> {
        self.registry.remove(id).await
    }

    pub async fn probe_connection(&self, id: &str) -> Result<ProbeReport> {
        self.registry.probe(id).await
    }

    /// Answers a question against a saved connection.
    pub async fn run_query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let orchestrator = self
            .orchestrator
            .as_ref()
            .ok_or_else(|| DataVizError::config("query pipeline is not configured"))?;
        Ok(orchestrator.run(&request).await?)
    }
}

async fn open_registry(config: &Config) -> Result<Arc<Registry>> {
    let store = SqliteStore::open(&config.store.resolved_path()).await?;
    let codec = AesGcmCodec::new(&EncryptionKey::resolve()?);
    let prober = DriverProber::new(config.probe);
    Ok(Arc::new(Registry::new(
        Arc::new(store),
        Arc::new(codec),
        Arc::new(prober),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReasoningConfig;
    use crate::db::MockConnector;
    use crate::error::ProbeFailure;
    use crate::probe::MockProber;
    use crate::registry::MemoryStore;

    fn facade() -> (DataViz, Arc<MockProber>) {
        let prober = Arc::new(MockProber::new());
        let registry = Arc::new(Registry::new(
            Arc::new(MemoryStore::new()),
            Arc::new(AesGcmCodec::new(&EncryptionKey::from_bytes([1u8; 32]))),
            prober.clone(),
        ));
        let orchestrator = Orchestrator::new(
            registry.clone(),
            ReasoningAdapter::new(Arc::new(MockReasoningEngine::new()), &ReasoningConfig::default()),
            Arc::new(MockConnector::default()),
        );
        (DataViz::from_parts(registry, orchestrator), prober)
    }

    fn input(name: &str, host: &str) -> NewConnection {
        NewConnection {
            name: name.to_string(),
            kind: "mysql".to_string(),
            host: host.to_string(),
            port: 3306,
            database: "shop".to_string(),
            username: "root".to_string(),
            password: "secret".to_string(),
            ssl: None,
        }
    }

    #[test]
    fn test_envelope_success_shape() {
        let envelope: Envelope<u32> = Ok(7).into();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "data": 7}));
    }

    #[test]
    fn test_envelope_error_shape() {
        let envelope: Envelope<()> =
            Err(DataVizError::probe(ProbeFailure::SslRequired, "server requires SSL")).into();
        assert!(!envelope.is_success());
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "SSLRequired");
        assert!(json["message"].as_str().unwrap().contains("server requires SSL"));
    }

    #[tokio::test]
    async fn test_add_returns_redacted_summary() {
        let (api, _) = facade();
        let summary = api.add_connection(input("shop", "db")).await.unwrap();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("secret"));
        assert_eq!(api.get_connection(&summary.id).await.unwrap(), summary);
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_connection_out_of_list() {
        let (api, prober) = facade();
        prober.fail_host("down", ProbeFailure::ConnectTimeout, "timed out");

        let err = api.add_connection(input("shop", "down")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectTimeout);
        assert!(api.list_connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_only_facade_refuses_queries() {
        let (api, _) = facade();
        let api = DataViz {
            orchestrator: None,
            ..api
        };
        let err = api.run_query(QueryRequest::new("q", "id")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
