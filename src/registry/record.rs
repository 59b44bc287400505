//! Connection record types.

use crate::error::{DataVizError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "postgresql")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "mongodb")]
    Mongo,
}

impl BackendKind {
    /// Returns the backend as a string for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
            Self::Mongo => "mongodb",
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::MySql => 3306,
            Self::Mongo => 27017,
        }
    }

    /// Returns true for backends that speak SQL.
    pub fn is_relational(&self) -> bool {
        matches!(self, Self::Postgres | Self::MySql)
    }
}

impl FromStr for BackendKind {
    type Err = DataVizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "mongodb" | "mongo" => Ok(Self::Mongo),
            _ => Err(DataVizError::unsupported_backend(s)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport security settings for a connection.
///
/// `mode` is backend-flavoured (`require`, `verify-full`, `REQUIRED`, ...).
/// `verify_peer = false` relaxes certificate checks where the driver allows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslPolicy {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub verify_peer: Option<bool>,
}

impl SslPolicy {
    pub fn mode(mode: impl Into<String>) -> Self {
        Self {
            mode: Some(mode.into()),
            verify_peer: None,
        }
    }

    /// Returns true if the policy explicitly turns transport security off.
    pub fn is_disabled(&self) -> bool {
        self.mode
            .as_deref()
            .map(|m| matches!(m.to_lowercase().as_str(), "disable" | "disabled" | "false" | "off"))
            .unwrap_or(false)
    }
}

/// Caller input for creating or replacing a connection.
///
/// `kind` stays a raw string until the registry validates it.
#[derive(Clone, Serialize, Deserialize)]
pub struct NewConnection {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl: Option<SslPolicy>,
}

impl fmt::Debug for NewConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewConnection")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"******")
            .field("ssl", &self.ssl)
            .finish()
    }
}

impl NewConnection {
    /// Validates the backend kind and builds an unsaved record.
    pub(crate) fn into_record(self, id: String, now: DateTime<Utc>) -> Result<ConnectionRecord> {
        let kind = self.kind.parse::<BackendKind>()?;
        Ok(ConnectionRecord {
            id,
            name: self.name,
            kind,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password,
            ssl: self.ssl,
            created_at: now,
            last_used_at: now,
        })
    }
}

/// A connection with its password decrypted.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: String,
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl: Option<SslPolicy>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"******")
            .field("ssl", &self.ssl)
            .finish_non_exhaustive()
    }
}

impl ConnectionRecord {
    /// Canonical connection string, password included.
    pub fn uri(&self) -> String {
        super::uri::build_uri(self)
    }

    /// Returns a display-safe string (no credentials).
    pub fn display_string(&self) -> String {
        format!("{} @ {}:{} ({})", self.database, self.host, self.port, self.kind)
    }

    /// Returns the password-free view of this record.
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            ssl: self.ssl.clone(),
            uri: super::uri::build_redacted_uri(self),
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

/// Password-free view of a connection, safe to return from list operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub ssl: Option<SslPolicy>,
    /// Connection string with the password masked.
    pub uri: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Durable form of a record: the password is only held encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConnection {
    pub id: String,
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password_ciphertext: Vec<u8>,
    pub ssl: Option<SslPolicy>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}
