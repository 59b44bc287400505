//! Liveness probes for registered connections.
//!
//! A probe opens a fresh connection, runs the cheapest server round-trip the
//! backend offers, and closes it. Failures come back as `DataVizError::Probe`
//! with a classified `ProbeFailure`.

mod classify;
mod mock;

pub use classify::{
    classify_code, classify_failure, classify_mongo, classify_mysql_error, classify_sqlx,
};
pub use mock::MockProber;

use crate::config::ProbeConfig;
use crate::error::{DataVizError, ProbeFailure, Result};
use crate::registry::{BackendKind, ConnectionRecord, SslPolicy};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of a successful probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub backend: BackendKind,
    /// Version string reported by the server, when available.
    pub server_version: Option<String>,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Checks that a connection can be opened and answers a trivial request.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, record: &ConnectionRecord) -> Result<ProbeReport>;
}

/// Backend-specific connection parameters for one probe attempt.
#[derive(Debug, Clone)]
pub enum ConnectParams {
    Postgres {
        options: PgConnectOptions,
        timeout: Duration,
    },
    MySql {
        options: MySqlConnectOptions,
        timeout: Duration,
    },
    Mongo {
        uri: String,
        server_selection: Duration,
        connect_timeout: Duration,
    },
}

impl ConnectParams {
    pub fn from_record(record: &ConnectionRecord, config: &ProbeConfig) -> Self {
        match record.kind {
            BackendKind::Postgres => Self::Postgres {
                options: postgres_options(record),
                timeout: config.timeout(),
            },
            BackendKind::MySql => Self::MySql {
                options: mysql_options(record),
                timeout: config.timeout(),
            },
            BackendKind::Mongo => Self::Mongo {
                uri: record.uri(),
                server_selection: config.mongo_server_selection(),
                connect_timeout: config.timeout(),
            },
        }
    }

    /// Overall budget for the attempt.
    ///
    /// Mongo gets its selection window plus the connect window so the driver's
    /// own server selection error fires first.
    pub fn budget(&self) -> Duration {
        match self {
            Self::Postgres { timeout, .. } | Self::MySql { timeout, .. } => *timeout,
            Self::Mongo {
                server_selection,
                connect_timeout,
                ..
            } => *server_selection + *connect_timeout,
        }
    }
}

/// Prober backed by the real drivers.
pub struct DriverProber {
    config: ProbeConfig,
}

impl DriverProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    async fn run(params: ConnectParams) -> Result<Option<String>> {
        match params {
            ConnectParams::Postgres { options, .. } => {
                let mut conn = PgConnection::connect_with(&options)
                    .await
                    .map_err(|e| sqlx_probe_error(&e))?;

                let version = sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(&mut conn)
                    .await;
                if let Err(e) = conn.close().await {
                    debug!("Error closing probe connection: {e}");
                }
                version.map(Some).map_err(|e| sqlx_probe_error(&e))
            }
            ConnectParams::MySql { options, .. } => {
                let mut conn = MySqlConnection::connect_with(&options)
                    .await
                    .map_err(|e| sqlx_probe_error(&e))?;

                let version = sqlx::query_scalar::<_, String>("SELECT VERSION()")
                    .fetch_one(&mut conn)
                    .await;
                if let Err(e) = conn.close().await {
                    debug!("Error closing probe connection: {e}");
                }
                version.map(Some).map_err(|e| sqlx_probe_error(&e))
            }
            ConnectParams::Mongo {
                uri,
                server_selection,
                connect_timeout,
            } => {
                use mongodb::options::ClientOptions;
                use mongodb::Client;

                let mut options = ClientOptions::parse(&uri)
                    .await
                    .map_err(|e| mongo_probe_error(&e))?;
                options.server_selection_timeout = Some(server_selection);
                options.connect_timeout = Some(connect_timeout);
                options.app_name = Some("dataviz".to_string());

                let client = Client::with_options(options).map_err(|e| mongo_probe_error(&e))?;
                let listed = client.list_database_names().await;
                client.shutdown().await;

                let names = listed.map_err(|e| mongo_probe_error(&e))?;
                debug!("Mongo probe saw {} databases", names.len());
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Prober for DriverProber {
    async fn probe(&self, record: &ConnectionRecord) -> Result<ProbeReport> {
        let started = Instant::now();
        debug!("Probing {}", record.display_string());

        let params = ConnectParams::from_record(record, &self.config);
        let server_version = with_budget(params.budget(), Self::run(params))
            .await
            .inspect_err(|e| warn!("Probe of {} failed: {e}", record.display_string()))?;

        Ok(ProbeReport {
            backend: record.kind,
            server_version,
            elapsed: started.elapsed(),
        })
    }
}

async fn with_budget<T>(budget: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(budget, fut).await.unwrap_or_else(|_| {
        Err(DataVizError::probe(
            ProbeFailure::ConnectTimeout,
            format!("no response within {}s", budget.as_secs()),
        ))
    })
}

fn sqlx_probe_error(err: &sqlx::Error) -> DataVizError {
    DataVizError::probe(classify_sqlx(err), err.to_string())
}

fn mongo_probe_error(err: &mongodb::error::Error) -> DataVizError {
    DataVizError::probe(classify_mongo(err), err.to_string())
}

pub(crate) fn postgres_options(record: &ConnectionRecord) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&record.host)
        .port(record.port)
        .username(&record.username)
        .password(&record.password)
        .database(&record.database)
        .application_name("dataviz");

    options.ssl_mode(postgres_ssl_mode(record.ssl.as_ref()))
}

/// Resolves the Postgres TLS mode. Unset means `prefer`.
pub(crate) fn postgres_ssl_mode(ssl: Option<&SslPolicy>) -> PgSslMode {
    let Some(policy) = ssl else {
        return PgSslMode::Prefer;
    };
    let mode = policy
        .mode
        .as_deref()
        .and_then(|m| PgSslMode::from_str(&m.to_lowercase()).ok())
        .unwrap_or(PgSslMode::Prefer);

    match (mode, policy.verify_peer) {
        (PgSslMode::VerifyCa | PgSslMode::VerifyFull, Some(false)) => PgSslMode::Require,
        (PgSslMode::Prefer | PgSslMode::Allow, Some(true)) => PgSslMode::VerifyFull,
        (mode, _) => mode,
    }
}

/// The `sslmode` connection string value for `mode`.
pub(crate) fn postgres_ssl_mode_name(mode: PgSslMode) -> &'static str {
    match mode {
        PgSslMode::Disable => "disable",
        PgSslMode::Allow => "allow",
        PgSslMode::Prefer => "prefer",
        PgSslMode::Require => "require",
        PgSslMode::VerifyCa => "verify-ca",
        PgSslMode::VerifyFull => "verify-full",
    }
}

pub(crate) fn mysql_options(record: &ConnectionRecord) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&record.host)
        .port(record.port)
        .username(&record.username)
        .password(&record.password)
        .database(&record.database)
        .ssl_mode(mysql_ssl_mode(record.ssl.as_ref()))
}

/// Resolves the MySQL TLS mode. Unset means `PREFERRED`.
pub(crate) fn mysql_ssl_mode(ssl: Option<&SslPolicy>) -> MySqlSslMode {
    let Some(policy) = ssl else {
        return MySqlSslMode::Preferred;
    };
    let mode = policy
        .mode
        .as_deref()
        .map(|m| m.to_lowercase().replace('-', "_"))
        .and_then(|m| match m.as_str() {
            "disable" | "false" | "off" => Some(MySqlSslMode::Disabled),
            "prefer" => Some(MySqlSslMode::Preferred),
            "require" | "true" | "on" => Some(MySqlSslMode::Required),
            "verify_full" => Some(MySqlSslMode::VerifyIdentity),
            other => MySqlSslMode::from_str(other).ok(),
        })
        .unwrap_or(MySqlSslMode::Preferred);

    match (mode, policy.verify_peer) {
        (MySqlSslMode::VerifyCa | MySqlSslMode::VerifyIdentity, Some(false)) => {
            MySqlSslMode::Required
        }
        (mode, _) => mode,
    }
}

/// The `ssl-mode` connection string value for `mode`.
pub(crate) fn mysql_ssl_mode_name(mode: MySqlSslMode) -> &'static str {
    match mode {
        MySqlSslMode::Disabled => "DISABLED",
        MySqlSslMode::Preferred => "PREFERRED",
        MySqlSslMode::Required => "REQUIRED",
        MySqlSslMode::VerifyCa => "VERIFY_CA",
        MySqlSslMode::VerifyIdentity => "VERIFY_IDENTITY",
    }
}
