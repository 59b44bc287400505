//! SQLite-backed connection store.

use super::migrations;
use super::record::{BackendKind, SslPolicy, StoredConnection};
use super::store::ConnectionStore;
use crate::error::{DataVizError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

const SELECT_COLUMNS: &str = "id, name, backend, host, port, database, username, \
     password_ciphertext, ssl_mode, ssl_verify_peer, created_at, last_used_at";

/// Raw database row for a connection.
#[derive(Debug, Clone, FromRow)]
struct ConnectionRow {
    id: String,
    name: String,
    backend: String,
    host: String,
    port: i64,
    database: String,
    username: String,
    password_ciphertext: Vec<u8>,
    ssl_mode: Option<String>,
    ssl_verify_peer: Option<bool>,
    created_at: String,
    last_used_at: String,
}

impl TryFrom<ConnectionRow> for StoredConnection {
    type Error = DataVizError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let kind = BackendKind::from_str(&row.backend)?;
        let port = u16::try_from(row.port).map_err(|_| {
            DataVizError::persistence(format!("Stored port out of range: {}", row.port))
        })?;
        let ssl = if row.ssl_mode.is_none() && row.ssl_verify_peer.is_none() {
            None
        } else {
            Some(SslPolicy {
                mode: row.ssl_mode,
                verify_peer: row.ssl_verify_peer,
            })
        };

        Ok(Self {
            id: row.id,
            name: row.name,
            kind,
            host: row.host,
            port,
            database: row.database,
            username: row.username,
            password_ciphertext: row.password_ciphertext,
            ssl,
            created_at: parse_timestamp(&row.created_at)?,
            last_used_at: parse_timestamp(&row.last_used_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DataVizError::persistence(format!("Invalid stored timestamp '{value}': {e}")))
}

fn map_write_error(e: sqlx::Error, name: &str, action: &str) -> DataVizError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return DataVizError::duplicate_name(name);
        }
    }
    DataVizError::persistence(format!("Failed to {action} connection: {e}"))
}

/// Connection store persisted in a local SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates the registry database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Connection registry opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        db_path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => {
                    warn!("Registry open attempt {} failed: {e}", attempt + 1);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DataVizError::persistence("Failed to open registry after retries")))
    }

    /// Opens a private in-memory registry.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DataVizError::persistence(format!("Failed to open in-memory registry: {e}")))?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool, db_path: None })
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| DataVizError::persistence(format!("Failed to connect to registry: {e}")))
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DataVizError::persistence(format!(
                    "Failed to create registry directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Returns the registry file path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_one_where(&self, column: &str, value: &str) -> Result<Option<StoredConnection>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM connections WHERE {column} = ?");
        let row: Option<ConnectionRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DataVizError::persistence(format!("Failed to get connection: {e}")))?;
        row.map(StoredConnection::try_from).transpose()
    }
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn insert(&self, record: &StoredConnection) -> Result<()> {
        let (ssl_mode, ssl_verify_peer) = ssl_columns(record.ssl.as_ref());
        sqlx::query(
            r#"
            INSERT INTO connections (id, name, backend, host, port, database, username,
                                     password_ciphertext, ssl_mode, ssl_verify_peer,
                                     created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.kind.as_str())
        .bind(&record.host)
        .bind(i64::from(record.port))
        .bind(&record.database)
        .bind(&record.username)
        .bind(&record.password_ciphertext)
        .bind(ssl_mode)
        .bind(ssl_verify_peer)
        .bind(record.created_at.to_rfc3339())
        .bind(record.last_used_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &record.name, "create"))?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredConnection>> {
        self.fetch_one_where("id", id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<StoredConnection>> {
        self.fetch_one_where("name", name).await
    }

    async fn list(&self) -> Result<Vec<StoredConnection>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM connections ORDER BY created_at, name");
        let rows: Vec<ConnectionRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataVizError::persistence(format!("Failed to list connections: {e}")))?;

        rows.into_iter().map(StoredConnection::try_from).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DataVizError::persistence(format!("Failed to delete connection: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace(&self, record: &StoredConnection) -> Result<()> {
        let (ssl_mode, ssl_verify_peer) = ssl_columns(record.ssl.as_ref());
        let result = sqlx::query(
            r#"
            UPDATE connections
            SET name = ?, backend = ?, host = ?, port = ?, database = ?, username = ?,
                password_ciphertext = ?, ssl_mode = ?, ssl_verify_peer = ?, last_used_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(record.kind.as_str())
        .bind(&record.host)
        .bind(i64::from(record.port))
        .bind(&record.database)
        .bind(&record.username)
        .bind(&record.password_ciphertext)
        .bind(ssl_mode)
        .bind(ssl_verify_peer)
        .bind(record.last_used_at.to_rfc3339())
        .bind(&record.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &record.name, "update"))?;

        if result.rows_affected() == 0 {
            return Err(DataVizError::not_found(format!("connection '{}'", record.id)));
        }
        Ok(())
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE connections SET last_used_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DataVizError::persistence(format!("Failed to update last used: {e}")))?;
        Ok(())
    }
}

fn ssl_columns(ssl: Option<&SslPolicy>) -> (Option<String>, Option<bool>) {
    match ssl {
        Some(policy) => (policy.mode.clone(), policy.verify_peer),
        None => (None, None),
    }
}
