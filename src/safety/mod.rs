//! Read-only guard for SQL that the system executes on its own.
//!
//! Statements come out of an untrusted trace, so anything that is not a plain
//! read is refused before it reaches a driver.

mod parser;

pub use parser::{classify_sql, SqlGuard};

use std::fmt;

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Explain,
    Show,
    /// A data-modifying or schema-changing statement, e.g. `DELETE`.
    Write(String),
    /// More than one statement was supplied.
    Multiple,
    /// The text could not be parsed.
    Unparseable,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Write(kind) => write!(f, "{kind}"),
            Self::Multiple => write!(f, "multiple statements"),
            Self::Unparseable => write!(f, "unparseable SQL"),
        }
    }
}

/// Outcome of checking one SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub statement_type: StatementType,
    /// Parser message when the text could not be parsed.
    pub detail: Option<String>,
}

impl Verdict {
    pub fn new(statement_type: StatementType) -> Self {
        Self {
            statement_type,
            detail: None,
        }
    }

    /// Returns true if the statement only reads data.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self.statement_type,
            StatementType::Select | StatementType::Explain | StatementType::Show
        )
    }
}
