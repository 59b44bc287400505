//! Durable storage seam for connection records.

use super::record::StoredConnection;
use crate::error::{DataVizError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for encrypted connection records.
///
/// Implementations must keep names unique and make `replace` atomic.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Inserts a new record. Fails with `DuplicateName` if the name is taken.
    async fn insert(&self, record: &StoredConnection) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<StoredConnection>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<StoredConnection>>;

    /// Returns all records ordered by creation time.
    async fn list(&self) -> Result<Vec<StoredConnection>>;

    /// Deletes a record. Returns false if no record had that id.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Overwrites the record with the same id in one step.
    async fn replace(&self, record: &StoredConnection) -> Result<()>;

    /// Updates the last-used timestamp.
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, StoredConnection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn insert(&self, record: &StoredConnection) -> Result<()> {
        let mut records = self.records.write().await;
        if records.values().any(|r| r.name == record.name) {
            return Err(DataVizError::duplicate_name(&record.name));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredConnection>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<StoredConnection>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<StoredConnection>> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn replace(&self, record: &StoredConnection) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(DataVizError::not_found(format!("connection '{}'", record.id)));
        }
        if records
            .values()
            .any(|r| r.name == record.name && r.id != record.id)
        {
            return Err(DataVizError::duplicate_name(&record.name));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(record) = self.records.write().await.get_mut(id) {
            record.last_used_at = at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::record::BackendKind;

    fn stored(id: &str, name: &str) -> StoredConnection {
        let now = Utc::now();
        StoredConnection {
            id: id.into(),
            name: name.into(),
            kind: BackendKind::Postgres,
            host: "localhost".into(),
            port: 5432,
            database: "app".into(),
            username: "app".into(),
            password_ciphertext: vec![1, 2, 3],
            ssl: None,
            created_at: now,
            last_used_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_name() {
        let store = MemoryStore::new();
        store.insert(&stored("a", "prod")).await.unwrap();
        let err = store.insert(&stored("b", "prod")).await.unwrap_err();
        assert!(matches!(err, DataVizError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let store = MemoryStore::new();
        store.insert(&stored("a", "prod")).await.unwrap();

        let mut updated = stored("a", "prod-renamed");
        updated.port = 6543;
        store.replace(&updated).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().port, 6543);
        assert!(store.find_by_name("prod").await.unwrap().is_none());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
    }
}
