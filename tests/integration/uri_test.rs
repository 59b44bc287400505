//! Connection strings parse back to the fields they were built from.

use chrono::Utc;
use dataviz_agent::registry::uri::{build_redacted_uri, build_uri};
use dataviz_agent::registry::{BackendKind, ConnectionRecord, SslPolicy};
use url::Url;

fn record(kind: BackendKind, username: &str, password: &str) -> ConnectionRecord {
    let now = Utc::now();
    ConnectionRecord {
        id: "id".to_string(),
        name: "n".to_string(),
        kind,
        host: "db.example.com".to_string(),
        port: 6543,
        database: "sales_2024".to_string(),
        username: username.to_string(),
        password: password.to_string(),
        ssl: Some(SslPolicy::mode("require")),
        created_at: now,
        last_used_at: now,
    }
}

#[test]
fn test_uri_round_trip_for_every_backend() {
    for kind in [BackendKind::Postgres, BackendKind::MySql, BackendKind::Mongo] {
        let rec = record(kind, "ana lyst@corp", "p@ss:w/rd?#%");
        let url = Url::parse(&build_uri(&rec)).unwrap();

        assert_eq!(url.host_str(), Some("db.example.com"), "{kind:?}");
        assert_eq!(url.port(), Some(6543), "{kind:?}");
        assert_eq!(url.path(), "/sales_2024", "{kind:?}");
        assert_eq!(
            urlencoding::decode(url.username()).unwrap(),
            "ana lyst@corp",
            "{kind:?}"
        );
        assert_eq!(
            urlencoding::decode(url.password().unwrap()).unwrap(),
            "p@ss:w/rd?#%",
            "{kind:?}"
        );
    }
}

#[test]
fn test_redacted_uri_hides_password() {
    for kind in [BackendKind::Postgres, BackendKind::MySql, BackendKind::Mongo] {
        let rec = record(kind, "analyst", "hunter2");
        let redacted = build_redacted_uri(&rec);
        assert!(!redacted.contains("hunter2"));
        assert!(Url::parse(&redacted).is_ok());
    }
}
