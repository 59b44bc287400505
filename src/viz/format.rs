//! Reshapes result rows into a chart payload.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::{CategoryValue, ChartData, ChartKind, ChartPayload, ColumnRole};
use crate::db::{QueryResult, Value};

/// Rows shown on a card before it is cut short.
const CARD_MAX_ROWS: usize = 10;

/// Builds the `kind` payload for `result`. An empty result always gives an
/// empty payload.
pub fn format(result: &QueryResult, kind: ChartKind) -> ChartPayload {
    if result.is_empty() || result.columns.is_empty() {
        return ChartPayload::empty(kind);
    }

    let roles = column_roles(result);
    let data = match kind {
        ChartKind::Line => series(result, &roles),
        ChartKind::Bar | ChartKind::Pie => categories(result, &roles),
        ChartKind::Card => ChartData::Summary(summary(result)),
    };
    ChartPayload { kind, data }
}

/// Roles from names and types, with the values deciding for unnamed columns.
fn column_roles(result: &QueryResult) -> Vec<Option<ColumnRole>> {
    result
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| ColumnRole::infer(column).or_else(|| role_from_values(result, idx)))
        .collect()
}

fn role_from_values(result: &QueryResult, idx: usize) -> Option<ColumnRole> {
    let values: Vec<&Value> = result
        .rows
        .iter()
        .filter_map(|row| row.get(idx))
        .filter(|v| !v.is_null())
        .collect();
    if values.is_empty() {
        return None;
    }
    if values.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
        Some(ColumnRole::Numeric)
    } else if values.iter().all(|v| v.as_str().and_then(parse_date).is_some()) {
        Some(ColumnRole::DateTime)
    } else if values.iter().all(|v| matches!(v, Value::String(_))) {
        Some(ColumnRole::Category)
    } else {
        None
    }
}

fn find_role(roles: &[Option<ColumnRole>], role: ColumnRole) -> Option<usize> {
    roles.iter().position(|r| *r == Some(role))
}

/// First numeric column other than `skip`.
fn value_column(roles: &[Option<ColumnRole>], skip: Option<usize>) -> Option<usize> {
    roles
        .iter()
        .enumerate()
        .find(|(idx, role)| **role == Some(ColumnRole::Numeric) && Some(*idx) != skip)
        .map(|(idx, _)| idx)
}

fn cell(row: &[Value], idx: Option<usize>) -> Option<&Value> {
    idx.and_then(|i| row.get(i))
}

/// Ordering key for an x value in a date/time column.
///
/// Columns named like `year` or `month` often hold plain numbers, which sort
/// numerically after real dates; anything else sorts last by its text.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum TimeKey {
    Date(NaiveDate),
    Number(f64),
    Text(String),
}

fn series(result: &QueryResult, roles: &[Option<ColumnRole>]) -> ChartData {
    let x_col = find_role(roles, ColumnRole::DateTime).or_else(|| find_role(roles, ColumnRole::Category));
    let is_date = x_col.is_some() && x_col == find_role(roles, ColumnRole::DateTime);
    let y_col = value_column(roles, x_col);

    let mut points: Vec<(Option<TimeKey>, String, Option<f64>)> = result
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let value = cell(row, x_col);
            let label = value
                .map(Value::to_display_string)
                .unwrap_or_else(|| idx.to_string());
            let y = cell(row, y_col).and_then(Value::as_f64);
            if !is_date {
                return (None, label, y);
            }
            match parse_date(&label) {
                Some(date) => (Some(TimeKey::Date(date)), date.format("%Y-%m-%d").to_string(), y),
                None => {
                    let key = value
                        .and_then(Value::as_f64)
                        .map(TimeKey::Number)
                        .unwrap_or_else(|| TimeKey::Text(label.clone()));
                    (Some(key), label, y)
                }
            }
        })
        .collect();

    if is_date {
        // Stable: equal keys keep their row order.
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    }

    let (x, y): (Vec<String>, Vec<Option<f64>>) = points.into_iter().map(|(_, x, y)| (x, y)).unzip();
    ChartData::Series { x, y }
}

fn categories(result: &QueryResult, roles: &[Option<ColumnRole>]) -> ChartData {
    let label_col = find_role(roles, ColumnRole::Category);
    let value_col = value_column(roles, label_col);

    let pairs = result
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| CategoryValue {
            label: cell(row, label_col)
                .map(Value::to_display_string)
                .unwrap_or_else(|| idx.to_string()),
            value: cell(row, value_col).and_then(Value::as_f64),
        })
        .collect();
    ChartData::Categories(pairs)
}

fn summary(result: &QueryResult) -> String {
    let mut lines: Vec<String> = result
        .rows
        .iter()
        .take(CARD_MAX_ROWS)
        .map(|row| {
            result
                .columns
                .iter()
                .zip(row.iter())
                .map(|(col, value)| format!("{}: {}", col.name, value))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect();
    if result.row_count() > CARD_MAX_ROWS {
        lines.push(format!("... and {} more rows", result.row_count() - CARD_MAX_ROWS));
    }
    lines.join("\n")
}

/// Parses the date part of common date and timestamp renderings.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d);
        }
    }
    // Year-month buckets such as `2024-03`.
    NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok()
}
