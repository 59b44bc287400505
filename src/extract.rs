//! Recovers the statement and its rows from an execution trace.
//!
//! Two strategies, first hit wins:
//!
//! 1. The last step whose action is a query tool. Its input is the SQL and
//!    its observation the rows.
//! 2. The last `Action Input: SELECT ...` in the flattened trace text.
//!
//! Later steps win over earlier ones because engines retry and correct
//! themselves; the last attempt is the one the answer is based on.

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use tracing::debug;

use crate::db::QueryResult;
use crate::error::{DataVizError, Result};
use crate::reasoning::{Action, ExecutionTrace, Observation};

/// Rows that came with the extracted statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRows {
    /// The engine reported structured rows.
    Observed(QueryResult),
    /// The statement ran and returned nothing.
    Empty,
    /// Only text was available; the statement must be run again to get rows.
    /// Carries the raw observation text, if any.
    Deferred(String),
}

/// Which strategy found the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    QueryStep,
    TextScan,
}

/// A statement and what is known about its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedResult {
    pub sql: String,
    pub rows: ResultRows,
    pub source: ExtractionSource,
}

/// Extracts the final statement from `trace`.
///
/// Fails with `NoQueryFound` when neither strategy finds a statement.
pub fn extract(trace: &ExecutionTrace) -> Result<ExtractedResult> {
    if let Some(found) = from_query_steps(trace) {
        debug!("statement taken from query step");
        return Ok(found);
    }
    if let Some(found) = from_text(&trace.flatten()) {
        debug!("statement recovered from trace text");
        return Ok(found);
    }
    Err(DataVizError::no_query(
        "the reasoning engine did not run a SQL query for this question",
    ))
}

fn from_query_steps(trace: &ExecutionTrace) -> Option<ExtractedResult> {
    trace.steps.iter().rev().find_map(|step| {
        let Action::Query { input, .. } = &step.action else {
            return None;
        };
        let sql = trim_preview(input);
        if sql.is_empty() {
            return None;
        }
        Some(ExtractedResult {
            sql,
            rows: rows_from_observation(&step.observation),
            source: ExtractionSource::QueryStep,
        })
    })
}

fn select_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)Action Input:\s*(SELECT.*?)(?:\[|\n|$)").ok())
        .as_ref()
}

fn from_text(text: &str) -> Option<ExtractedResult> {
    let sql = select_regex()?
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|sql| !sql.is_empty())
        .last()?;
    Some(ExtractedResult {
        sql,
        rows: ResultRows::Deferred(String::new()),
        source: ExtractionSource::TextScan,
    })
}

/// Drops an inline result preview, which starts at the first `[`.
fn trim_preview(input: &str) -> String {
    let sql = match input.find('[') {
        Some(idx) => &input[..idx],
        None => input,
    };
    sql.trim().trim_matches('"').trim().to_string()
}

fn rows_from_observation(observation: &Observation) -> ResultRows {
    match observation {
        Observation::Rows(result) if result.is_empty() => ResultRows::Empty,
        Observation::Rows(result) => ResultRows::Observed(result.clone()),
        Observation::Text(text) => rows_from_text(text),
        Observation::Missing => ResultRows::Deferred(String::new()),
    }
}

fn rows_from_text(text: &str) -> ResultRows {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ResultRows::Empty;
    }
    match serde_json::from_str::<JsonValue>(trimmed)
        .ok()
        .and_then(|v| QueryResult::from_json_rows(&v))
    {
        Some(result) if result.is_empty() => ResultRows::Empty,
        Some(result) => ResultRows::Observed(result),
        None => ResultRows::Deferred(text.to_string()),
    }
}
