//! Connection registry.
//!
//! Named, durable connection records with encrypted passwords. Every record is
//! probed before it is stored, so the registry only ever holds connections
//! that worked at the time they were written.

mod migrations;
mod record;
mod sqlite;
mod store;
pub mod uri;

pub use record::{
    BackendKind, ConnectionRecord, ConnectionSummary, NewConnection, SslPolicy, StoredConnection,
};
pub use sqlite::SqliteStore;
pub use store::{ConnectionStore, MemoryStore};

use crate::codec::CredentialCodec;
use crate::error::{DataVizError, Result};
use crate::probe::{ProbeReport, Prober};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Registry of saved connections.
///
/// Writes are serialized so the duplicate-name check and the insert cannot
/// interleave with another writer.
pub struct Registry {
    store: Arc<dyn ConnectionStore>,
    codec: Arc<dyn CredentialCodec>,
    prober: Arc<dyn Prober>,
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        codec: Arc<dyn CredentialCodec>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            store,
            codec,
            prober,
            write_lock: Mutex::new(()),
        }
    }

    /// Validates, probes, encrypts and stores a new connection. Returns its id.
    pub async fn add(&self, input: NewConnection) -> Result<String> {
        let record = input.into_record(Uuid::new_v4().to_string(), Utc::now())?;
        self.ensure_name_free(&record.name, None).await?;

        self.prober.probe(&record).await?;

        let _guard = self.write_lock.lock().await;
        self.ensure_name_free(&record.name, None).await?;
        let stored = self.seal(&record)?;
        self.store.insert(&stored).await?;

        info!("Registered connection '{}' ({})", record.name, record.id);
        Ok(record.id)
    }

    /// Probes a connection without saving it.
    pub async fn verify(&self, input: NewConnection) -> Result<ProbeReport> {
        let record = input.into_record(String::new(), Utc::now())?;
        self.prober.probe(&record).await
    }

    /// Re-probes a stored connection and marks it used.
    pub async fn probe(&self, id: &str) -> Result<ProbeReport> {
        self.checkout_with_report(id).await.map(|(_, report)| report)
    }

    /// Fetches a connection for use: decrypted, probed, and marked used.
    pub async fn checkout(&self, id: &str) -> Result<ConnectionRecord> {
        self.checkout_with_report(id).await.map(|(record, _)| record)
    }

    async fn checkout_with_report(&self, id: &str) -> Result<(ConnectionRecord, ProbeReport)> {
        let mut record = self.get(id).await?;
        let report = self.prober.probe(&record).await?;
        let now = Utc::now();
        self.store.touch(id, now).await?;
        record.last_used_at = now;
        Ok((record, report))
    }

    /// Returns a record with its password decrypted.
    pub async fn get(&self, id: &str) -> Result<ConnectionRecord> {
        let stored = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| DataVizError::not_found(format!("connection '{id}'")))?;
        self.open(stored)
    }

    /// Lists all connections without passwords.
    pub async fn list(&self) -> Result<Vec<ConnectionSummary>> {
        let stored = self.store.list().await?;
        Ok(stored.iter().map(summarize).collect())
    }

    /// Deletes a connection. Fails with `NotFound` if it does not exist.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.store.delete(id).await? {
            return Err(DataVizError::not_found(format!("connection '{id}'")));
        }
        info!("Removed connection {id}");
        Ok(())
    }

    /// Replaces a connection's fields, keeping its id and creation time.
    ///
    /// The new fields are probed first. On any failure the old record stays.
    pub async fn update(&self, id: &str, input: NewConnection) -> Result<()> {
        let existing = self.get(id).await?;
        let mut record = input.into_record(existing.id.clone(), Utc::now())?;
        record.created_at = existing.created_at;
        self.ensure_name_free(&record.name, Some(id)).await?;

        self.prober.probe(&record).await?;

        let _guard = self.write_lock.lock().await;
        self.ensure_name_free(&record.name, Some(id)).await?;
        let stored = self.seal(&record)?;
        self.store.replace(&stored).await?;

        info!("Updated connection '{}' ({})", record.name, record.id);
        Ok(())
    }

    /// Records that a connection was just used.
    pub async fn touch(&self, id: &str) -> Result<()> {
        self.store.touch(id, Utc::now()).await
    }

    async fn ensure_name_free(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        match self.store.find_by_name(name).await? {
            Some(found) if Some(found.id.as_str()) != except_id => {
                debug!("Name '{name}' already used by {}", found.id);
                Err(DataVizError::duplicate_name(name))
            }
            _ => Ok(()),
        }
    }

    fn seal(&self, record: &ConnectionRecord) -> Result<StoredConnection> {
        Ok(StoredConnection {
            id: record.id.clone(),
            name: record.name.clone(),
            kind: record.kind,
            host: record.host.clone(),
            port: record.port,
            database: record.database.clone(),
            username: record.username.clone(),
            password_ciphertext: self.codec.encrypt(&record.password)?,
            ssl: record.ssl.clone(),
            created_at: record.created_at,
            last_used_at: record.last_used_at,
        })
    }

    fn open(&self, stored: StoredConnection) -> Result<ConnectionRecord> {
        let password = self.codec.decrypt(&stored.password_ciphertext)?;
        Ok(ConnectionRecord {
            id: stored.id,
            name: stored.name,
            kind: stored.kind,
            host: stored.host,
            port: stored.port,
            database: stored.database,
            username: stored.username,
            password,
            ssl: stored.ssl,
            created_at: stored.created_at,
            last_used_at: stored.last_used_at,
        })
    }
}

/// Builds the redacted view straight from the stored form; no decryption needed.
fn summarize(stored: &StoredConnection) -> ConnectionSummary {
    let placeholder = ConnectionRecord {
        id: stored.id.clone(),
        name: stored.name.clone(),
        kind: stored.kind,
        host: stored.host.clone(),
        port: stored.port,
        database: stored.database.clone(),
        username: stored.username.clone(),
        password: if stored.password_ciphertext.is_empty() {
            String::new()
        } else {
            "*".to_string()
        },
        ssl: stored.ssl.clone(),
        created_at: stored.created_at,
        last_used_at: stored.last_used_at,
    };
    placeholder.summary()
}
