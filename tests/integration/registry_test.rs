//! Registry tests against the SQLite store.

use dataviz_agent::codec::{AesGcmCodec, EncryptionKey};
use dataviz_agent::error::{ErrorKind, ProbeFailure};
use dataviz_agent::probe::MockProber;
use dataviz_agent::registry::{ConnectionStore, NewConnection, Registry, SqliteStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const KEY: [u8; 32] = [3u8; 32];

fn input(name: &str, host: &str) -> NewConnection {
    NewConnection {
        name: name.to_string(),
        kind: "postgresql".to_string(),
        host: host.to_string(),
        port: 5432,
        database: "sales".to_string(),
        username: "analyst".to_string(),
        password: "s3cr3t-pw".to_string(),
        ssl: None,
    }
}

async fn open(path: &Path, key: [u8; 32], prober: Arc<MockProber>) -> (Registry, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open(path).await.unwrap());
    let registry = Registry::new(
        store.clone(),
        Arc::new(AesGcmCodec::new(&EncryptionKey::from_bytes(key))),
        prober,
    );
    (registry, store)
}

#[tokio::test]
async fn test_connections_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("connections.db");

    let id = {
        let (registry, store) = open(&path, KEY, Arc::new(MockProber::new())).await;
        let id = registry.add(input("sales", "db.internal")).await.unwrap();
        store.close().await;
        id
    };

    let (registry, _) = open(&path, KEY, Arc::new(MockProber::new())).await;
    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.name, "sales");
    assert_eq!(record.password, "s3cr3t-pw");
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_password_is_stored_encrypted() {
    let dir = TempDir::new().unwrap();
    let (registry, store) = open(&dir.path().join("c.db"), KEY, Arc::new(MockProber::new())).await;
    let id = registry.add(input("sales", "db.internal")).await.unwrap();

    let stored = store.get(&id).await.unwrap().unwrap();
    assert!(!stored.password_ciphertext.is_empty());
    let needle = b"s3cr3t-pw";
    assert!(!stored
        .password_ciphertext
        .windows(needle.len())
        .any(|w| w == needle));
}

#[tokio::test]
async fn test_wrong_key_cannot_decrypt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.db");
    let id = {
        let (registry, store) = open(&path, KEY, Arc::new(MockProber::new())).await;
        let id = registry.add(input("sales", "db.internal")).await.unwrap();
        store.close().await;
        id
    };

    let (registry, _) = open(&path, [4u8; 32], Arc::new(MockProber::new())).await;
    let err = registry.get(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CodecError);
    // Listing never decrypts, so it still works.
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = open(&dir.path().join("c.db"), KEY, Arc::new(MockProber::new())).await;
    registry.add(input("sales", "a")).await.unwrap();

    let err = registry.add(input("sales", "b")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateName);
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_probe_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let prober = Arc::new(MockProber::new());
    prober.fail_host("locked", ProbeFailure::AuthFailed, "password authentication failed");
    let (registry, _) = open(&dir.path().join("c.db"), KEY, prober).await;

    let err = registry.add(input("sales", "locked")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthFailed);
    assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_keeps_identity_and_rolls_back_on_failure() {
    let dir = TempDir::new().unwrap();
    let prober = Arc::new(MockProber::new());
    let (registry, _) = open(&dir.path().join("c.db"), KEY, prober.clone()).await;
    let id = registry.add(input("sales", "old-host")).await.unwrap();
    let before = registry.get(&id).await.unwrap();

    registry.update(&id, input("sales-v2", "new-host")).await.unwrap();
    let after = registry.get(&id).await.unwrap();
    assert_eq!(after.id, id);
    assert_eq!(after.name, "sales-v2");
    assert_eq!(after.host, "new-host");
    assert_eq!(after.created_at, before.created_at);

    prober.fail_host("dead-host", ProbeFailure::ConnectTimeout, "timed out");
    let err = registry.update(&id, input("sales-v3", "dead-host")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectTimeout);
    assert_eq!(registry.get(&id).await.unwrap().host, "new-host");
}

#[tokio::test]
async fn test_remove_unknown_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = open(&dir.path().join("c.db"), KEY, Arc::new(MockProber::new())).await;
    let id = registry.add(input("sales", "db")).await.unwrap();

    registry.remove(&id).await.unwrap();
    let err = registry.remove(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(registry.get(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_unsupported_backend() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = open(&dir.path().join("c.db"), KEY, Arc::new(MockProber::new())).await;
    let mut bad = input("oracle", "db");
    bad.kind = "oracle".to_string();

    let err = registry.add(bad).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedBackend);
}
