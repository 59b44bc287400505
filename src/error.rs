//! Error types for the dataviz agent.
//!
//! Every failure that leaves a component is one of the classified kinds below.
//! Driver and engine error text is carried in the message, never as a type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classified reason a liveness probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    /// Credentials were rejected by the server.
    AuthFailed,
    /// The server insists on (or refuses) an encrypted transport.
    SslRequired,
    /// The server could not be reached within the probe budget.
    ConnectTimeout,
    /// The requested database does not exist on the server.
    DatabaseMissing,
    /// No known pattern matched the driver message.
    Other,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AuthFailed => "authentication failed",
            Self::SslRequired => "SSL required",
            Self::ConnectTimeout => "connection timed out",
            Self::DatabaseMissing => "database missing",
            Self::Other => "connection failed",
        };
        f.write_str(text)
    }
}

/// Main error type for dataviz operations.
#[derive(Error, Debug)]
pub enum DataVizError {
    /// Backend kind is not one of the supported engines.
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// A connection with the same display name already exists.
    #[error("Duplicate connection name: {0}")]
    DuplicateName(String),

    /// Unknown connection id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Liveness probe failed; `failure` is derived from the driver message.
    #[error("Probe failed ({failure}): {message}")]
    Probe {
        failure: ProbeFailure,
        message: String,
    },

    /// The reasoning engine failed, timed out, or could not introspect the schema.
    #[error("Reasoning engine error: {0}")]
    ReasoningEngine(String),

    /// No SQL statement could be recovered from the execution trace.
    #[error("No query found: {0}")]
    NoQueryFound(String),

    /// Credential encryption or decryption failed.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Durable store errors (open, migrate, read, write).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid config file or environment.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected states.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable error kind reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedBackend,
    DuplicateName,
    NotFound,
    AuthFailed,
    #[serde(rename = "SSLRequired")]
    SslRequired,
    ConnectTimeout,
    DatabaseMissing,
    /// Probe failure that matched no known pattern.
    Other,
    ReasoningEngineError,
    NoQueryFound,
    CodecError,
    StorageError,
    ConfigError,
    InternalError,
}

impl DataVizError {
    /// Creates an unsupported-backend error for the given kind string.
    pub fn unsupported_backend(kind: impl Into<String>) -> Self {
        Self::UnsupportedBackend(kind.into())
    }

    /// Creates a duplicate-name error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Creates a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a classified probe error.
    pub fn probe(failure: ProbeFailure, msg: impl Into<String>) -> Self {
        Self::Probe {
            failure,
            message: msg.into(),
        }
    }

    /// Creates a reasoning engine error.
    pub fn reasoning(msg: impl Into<String>) -> Self {
        Self::ReasoningEngine(msg.into())
    }

    /// Creates a no-query-found error.
    pub fn no_query(msg: impl Into<String>) -> Self {
        Self::NoQueryFound(msg.into())
    }

    /// Creates a codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Creates a persistence error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the caller-facing kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedBackend(_) => ErrorKind::UnsupportedBackend,
            Self::DuplicateName(_) => ErrorKind::DuplicateName,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Probe { failure, .. } => match failure {
                ProbeFailure::AuthFailed => ErrorKind::AuthFailed,
                ProbeFailure::SslRequired => ErrorKind::SslRequired,
                ProbeFailure::ConnectTimeout => ErrorKind::ConnectTimeout,
                ProbeFailure::DatabaseMissing => ErrorKind::DatabaseMissing,
                ProbeFailure::Other => ErrorKind::Other,
            },
            Self::ReasoningEngine(_) => ErrorKind::ReasoningEngineError,
            Self::NoQueryFound(_) => ErrorKind::NoQueryFound,
            Self::Codec(_) => ErrorKind::CodecError,
            Self::Persistence(_) => ErrorKind::StorageError,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedBackend(_) => "Unsupported Backend",
            Self::DuplicateName(_) => "Duplicate Name",
            Self::NotFound(_) => "Not Found",
            Self::Probe { .. } => "Connection Error",
            Self::ReasoningEngine(_) => "Reasoning Engine Error",
            Self::NoQueryFound(_) => "No Query Found",
            Self::Codec(_) => "Codec Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using DataVizError.
pub type Result<T> = std::result::Result<T, DataVizError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = DataVizError::not_found("connection 'abc'");
        assert_eq!(err.to_string(), "Not found: connection 'abc'");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.category(), "Not Found");
    }

    #[test]
    fn test_probe_error_kind_follows_failure() {
        let cases = [
            (ProbeFailure::AuthFailed, ErrorKind::AuthFailed),
            (ProbeFailure::SslRequired, ErrorKind::SslRequired),
            (ProbeFailure::ConnectTimeout, ErrorKind::ConnectTimeout),
            (ProbeFailure::DatabaseMissing, ErrorKind::DatabaseMissing),
            (ProbeFailure::Other, ErrorKind::Other),
        ];
        for (failure, kind) in cases {
            assert_eq!(DataVizError::probe(failure, "boom").kind(), kind);
        }
    }

    #[test]
    fn test_probe_error_display() {
        let err = DataVizError::probe(
            ProbeFailure::AuthFailed,
            "password authentication failed for user \"bob\"",
        );
        assert_eq!(
            err.to_string(),
            "Probe failed (authentication failed): password authentication failed for user \"bob\""
        );
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::SslRequired).unwrap();
        assert_eq!(json, "\"SSLRequired\"");
        let json = serde_json::to_string(&ErrorKind::ReasoningEngineError).unwrap();
        assert_eq!(json, "\"ReasoningEngineError\"");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DataVizError>();
    }
}
