//! Maps driver failures onto `ProbeFailure`.
//!
//! Server error codes win when the driver exposes them; otherwise the message
//! is matched against a substring table. Earlier rows take precedence.

use sqlx::mysql::MySqlDatabaseError;

use crate::error::ProbeFailure;

/// SQLSTATE and MongoDB command codes with a known meaning.
const CODE_TABLE: &[(&str, ProbeFailure)] = &[
    // sqlstate
    ("28P01", ProbeFailure::AuthFailed),
    ("28000", ProbeFailure::AuthFailed),
    ("3D000", ProbeFailure::DatabaseMissing),
    // mongo
    ("18", ProbeFailure::AuthFailed),
];

/// MySQL server error numbers. sqlx reports the SQLSTATE as the code, so these
/// are looked up separately.
const MYSQL_ERROR_TABLE: &[(u16, ProbeFailure)] = &[
    (1044, ProbeFailure::AuthFailed),
    (1045, ProbeFailure::AuthFailed),
    (1049, ProbeFailure::DatabaseMissing),
    (3159, ProbeFailure::SslRequired),
];

const AUTH_PATTERNS: &[&str] = &[
    "password authentication failed",
    "authentication failed",
    "access denied",
    "invalid password",
    "scram",
    "auth error",
    "not authorized",
];

const DATABASE_PATTERNS: &[&str] = &["unknown database", "database \"", "no such database"];

// Phrases only: hostnames such as `ssl-db.internal` show up in driver text.
const SSL_PATTERNS: &[&str] = &[
    "ssl is required",
    "ssl required",
    "requires ssl",
    "ssl off",
    "ssl connection",
    "ssl handshake",
    "support ssl",
    "ssl/tls",
    "tls is required",
    "tls required",
    "requires tls",
    "tls connection",
    "tls handshake",
    "support tls",
    "secure transport",
    "no encryption",
    "certificate",
];

const TIMEOUT_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "server selection",
    "connection refused",
    "could not connect",
    "no route to host",
    "failed to lookup address",
    "name or service not known",
];

/// Classifies a server error code, if it is one we know.
pub fn classify_code(code: &str) -> Option<ProbeFailure> {
    CODE_TABLE
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, failure)| *failure)
}

/// Classifies a MySQL server error number, if it is one we know.
pub fn classify_mysql_error(number: u16) -> Option<ProbeFailure> {
    MYSQL_ERROR_TABLE
        .iter()
        .find(|(known, _)| *known == number)
        .map(|(_, failure)| *failure)
}

/// Classifies a driver message by substring.
pub fn classify_failure(message: &str) -> ProbeFailure {
    let lower = message.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(AUTH_PATTERNS) || (lower.contains("role \"") && lower.contains("does not exist")) {
        ProbeFailure::AuthFailed
    } else if matches(DATABASE_PATTERNS) && lower.contains("exist")
        || lower.contains("unknown database")
    {
        ProbeFailure::DatabaseMissing
    } else if matches(SSL_PATTERNS) {
        ProbeFailure::SslRequired
    } else if matches(TIMEOUT_PATTERNS) {
        ProbeFailure::ConnectTimeout
    } else {
        ProbeFailure::Other
    }
}

/// Classifies a sqlx error from Postgres or MySQL.
pub fn classify_sqlx(err: &sqlx::Error) -> ProbeFailure {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .and_then(|mysql| classify_mysql_error(mysql.number()))
            .or_else(|| db_err.code().and_then(|code| classify_code(&code)))
            .unwrap_or_else(|| classify_failure(db_err.message())),
        sqlx::Error::PoolTimedOut => ProbeFailure::ConnectTimeout,
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            ProbeFailure::ConnectTimeout
        }
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            ProbeFailure::ConnectTimeout
        }
        sqlx::Error::Tls(_) => ProbeFailure::SslRequired,
        other => classify_failure(&other.to_string()),
    }
}

/// Classifies a MongoDB driver error.
pub fn classify_mongo(err: &mongodb::error::Error) -> ProbeFailure {
    use mongodb::error::ErrorKind;

    match err.kind.as_ref() {
        ErrorKind::Authentication { .. } => ProbeFailure::AuthFailed,
        ErrorKind::ServerSelection { message, .. } => match classify_failure(message) {
            ProbeFailure::Other => ProbeFailure::ConnectTimeout,
            found => found,
        },
        ErrorKind::Command(command) => classify_code(&command.code.to_string())
            .unwrap_or_else(|| classify_failure(&command.message)),
        _ => classify_failure(&err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_messages() {
        assert_eq!(
            classify_failure("password authentication failed for user \"app\""),
            ProbeFailure::AuthFailed
        );
        assert_eq!(
            classify_failure("database \"nosuchdb\" does not exist"),
            ProbeFailure::DatabaseMissing
        );
        assert_eq!(
            classify_failure("role \"ghost\" does not exist"),
            ProbeFailure::AuthFailed
        );
        assert_eq!(
            classify_failure(
                "no pg_hba.conf entry for host \"10.0.0.1\", user \"app\", database \"app\", no encryption"
            ),
            ProbeFailure::SslRequired
        );
    }

    #[test]
    fn test_mysql_messages() {
        assert_eq!(
            classify_failure("Access denied for user 'app'@'10.0.0.1' (using password: YES)"),
            ProbeFailure::AuthFailed
        );
        assert_eq!(
            classify_failure("Unknown database 'shop'"),
            ProbeFailure::DatabaseMissing
        );
        assert_eq!(
            classify_failure("Connections using insecure transport are prohibited while --require_secure_transport=ON."),
            ProbeFailure::SslRequired
        );
    }

    #[test]
    fn test_network_messages() {
        assert_eq!(
            classify_failure("Server selection timeout: No available servers"),
            ProbeFailure::ConnectTimeout
        );
        assert_eq!(
            classify_failure("error communicating with database: Connection refused (os error 111)"),
            ProbeFailure::ConnectTimeout
        );
    }

    #[test]
    fn test_unknown_message_is_other() {
        assert_eq!(classify_failure("something odd happened"), ProbeFailure::Other);
    }

    #[test]
    fn test_codes() {
        assert_eq!(classify_code("28P01"), Some(ProbeFailure::AuthFailed));
        assert_eq!(classify_code("3d000"), Some(ProbeFailure::DatabaseMissing));
        assert_eq!(classify_code("18"), Some(ProbeFailure::AuthFailed));
        assert_eq!(classify_code("42P01"), None);
    }

    #[test]
    fn test_mysql_error_numbers() {
        assert_eq!(classify_mysql_error(1045), Some(ProbeFailure::AuthFailed));
        assert_eq!(classify_mysql_error(1044), Some(ProbeFailure::AuthFailed));
        assert_eq!(classify_mysql_error(1049), Some(ProbeFailure::DatabaseMissing));
        assert_eq!(classify_mysql_error(3159), Some(ProbeFailure::SslRequired));
        assert_eq!(classify_mysql_error(1146), None);
        // Numbers are not SQLSTATEs.
        assert_eq!(classify_code("1049"), None);
    }

    #[test]
    fn test_tls_named_hosts_are_not_ssl_failures() {
        assert_eq!(
            classify_failure("error connecting to ssl-db.internal:5432: Connection refused (os error 111)"),
            ProbeFailure::ConnectTimeout
        );
        assert_eq!(
            classify_failure("failed to lookup address information for tls-proxy.corp"),
            ProbeFailure::ConnectTimeout
        );
        assert_eq!(
            classify_failure("query failed on /var/lib/ssl/data"),
            ProbeFailure::Other
        );
    }

    #[test]
    fn test_ssl_phrases() {
        assert_eq!(
            classify_failure("FATAL: SSL connection is required"),
            ProbeFailure::SslRequired
        );
        assert_eq!(
            classify_failure("no pg_hba.conf entry for host \"10.0.0.1\", user \"app\", database \"app\", SSL off"),
            ProbeFailure::SslRequired
        );
        assert_eq!(
            classify_failure("error occurred while attempting to establish a TLS connection: server does not support TLS"),
            ProbeFailure::SslRequired
        );
        assert_eq!(
            classify_failure("TLS handshake failed: received fatal alert"),
            ProbeFailure::SslRequired
        );
    }

    #[test]
    fn test_sqlx_pool_timeout() {
        assert_eq!(
            classify_sqlx(&sqlx::Error::PoolTimedOut),
            ProbeFailure::ConnectTimeout
        );
    }
}
