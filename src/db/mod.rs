//! SQL execution layer.
//!
//! Used by the in-process agent for schema grounding and tool calls, and by
//! the orchestrator to materialise rows when a trace carried only text.

mod mock;
mod mysql;
mod postgres;
mod schema;
mod types;

pub use mock::{MockConnector, MockDatabaseClient};
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use schema::{format_tables, Column, Table};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::error::{DataVizError, Result};
use crate::probe::{mysql_options, postgres_options};
use crate::registry::{BackendKind, ConnectionRecord};
use async_trait::async_trait;

/// Query timeout in seconds.
pub(crate) const QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum rows to return from a query.
pub(crate) const MAX_ROWS: usize = 1000;

/// Interface for SQL database clients.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Lists base tables visible to the connection.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describes the given tables, each with up to `sample_rows` example rows.
    async fn describe_tables(&self, tables: &[String], sample_rows: usize) -> Result<Vec<Table>>;

    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}

/// Opens database clients for registered connections.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(&self, record: &ConnectionRecord) -> Result<Box<dyn DatabaseClient>>;
}

/// Connector backed by the sqlx drivers.
///
/// Connects with the same options a connection check uses, TLS mode included.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriverConnector;

#[async_trait]
impl DatabaseConnector for DriverConnector {
    async fn connect(&self, record: &ConnectionRecord) -> Result<Box<dyn DatabaseClient>> {
        match record.kind {
            BackendKind::Postgres => Ok(Box::new(
                PostgresClient::connect_with(postgres_options(record)).await?,
            )),
            BackendKind::MySql => Ok(Box::new(MySqlClient::connect_with(mysql_options(record)).await?)),
            BackendKind::Mongo => Err(DataVizError::reasoning(
                "SQL execution is not available for mongodb connections",
            )),
        }
    }
}

/// Resolves which tables to describe: the allowlist if given, else all tables.
///
/// Unknown allowlist entries are an error so the engine never reasons over a
/// table that is not there.
pub async fn resolve_tables(
    client: &dyn DatabaseClient,
    allowlist: Option<&[String]>,
) -> Result<Vec<String>> {
    let available = client.list_tables().await?;
    match allowlist {
        None => Ok(available),
        Some(wanted) => {
            let missing: Vec<&str> = wanted
                .iter()
                .filter(|t| !available.contains(t))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(DataVizError::reasoning(format!(
                    "include_tables {missing:?} not found in database"
                )));
            }
            Ok(wanted.to_vec())
        }
    }
}
