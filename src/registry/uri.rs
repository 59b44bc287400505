//! Canonical connection strings per backend.

use super::record::{BackendKind, ConnectionRecord, SslPolicy};
use crate::probe::{mysql_ssl_mode, mysql_ssl_mode_name, postgres_ssl_mode, postgres_ssl_mode_name};

/// Builds the canonical connection string for a record.
///
/// Username and password are percent-encoded so reserved characters survive.
pub fn build_uri(record: &ConnectionRecord) -> String {
    render(record, &urlencoding::encode(&record.password))
}

/// Same as `build_uri` with the password replaced by a mask.
pub fn build_redacted_uri(record: &ConnectionRecord) -> String {
    render(record, "******")
}

fn render(record: &ConnectionRecord, password: &str) -> String {
    let username = urlencoding::encode(&record.username);
    let userinfo = if record.username.is_empty() {
        String::new()
    } else if record.password.is_empty() {
        format!("{username}@")
    } else {
        format!("{username}:{password}@")
    };

    let scheme = match record.kind {
        BackendKind::Postgres => "postgresql",
        BackendKind::MySql => "mysql",
        BackendKind::Mongo => "mongodb",
    };

    let mut uri = format!(
        "{scheme}://{userinfo}{}:{}/{}",
        host(&record.host),
        record.port,
        urlencoding::encode(&record.database)
    );

    let params = query_params(record.kind, record.ssl.as_ref(), !record.username.is_empty());
    if !params.is_empty() {
        uri.push('?');
        uri.push_str(&params.join("&"));
    }
    uri
}

/// IPv6 literals need brackets to be told apart from the port.
fn host(host: &str) -> std::borrow::Cow<'_, str> {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]").into()
    } else {
        host.into()
    }
}

fn query_params(kind: BackendKind, ssl: Option<&SslPolicy>, has_user: bool) -> Vec<String> {
    let mut params = Vec::new();
    match kind {
        // Resolved modes, matching what a connection check negotiates.
        BackendKind::Postgres => {
            if ssl.is_some() {
                params.push(format!("sslmode={}", postgres_ssl_mode_name(postgres_ssl_mode(ssl))));
            }
        }
        BackendKind::MySql => {
            if ssl.is_some() {
                params.push(format!("ssl-mode={}", mysql_ssl_mode_name(mysql_ssl_mode(ssl))));
            }
        }
        BackendKind::Mongo => {
            if has_user {
                params.push("authSource=admin".to_string());
            }
            if let Some(ssl) = ssl {
                if ssl.is_disabled() {
                    params.push("tls=false".to_string());
                } else {
                    params.push("tls=true".to_string());
                    if ssl.verify_peer == Some(false) {
                        params.push("tlsAllowInvalidCertificates=true".to_string());
                    }
                }
            }
        }
    }
    params
}
