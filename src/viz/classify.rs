//! Rule-based chart classifier.

use super::ChartKind;
use crate::db::ColumnInfo;

/// What a result column is used for when charting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    DateTime,
    Category,
    Numeric,
}

const DATE_TOKENS: &[&str] = &[
    "date", "time", "timestamp", "datetime", "day", "week", "month", "year", "quarter", "period",
    "dt", "created", "updated",
];

const NUMERIC_TOKENS: &[&str] = &[
    "total", "sum", "count", "avg", "average", "amount", "sales", "revenue", "quantity", "qty",
    "price", "cost", "value", "profit", "min", "max", "units", "score", "num",
];

const CATEGORY_TOKENS: &[&str] = &[
    "product", "category", "name", "region", "type", "brand", "customer", "country", "city",
    "state", "segment", "department", "group", "channel", "store", "status", "label", "class",
];

const TREND_KEYWORDS: &[&str] = &[
    "trend", "over time", "monthly", "daily", "weekly", "yearly", "annual", "quarterly",
    "timeline", "time series", "history",
];

const COMPARISON_KEYWORDS: &[&str] = &["compare", "comparison", "versus", "vs", "against"];

const DISTRIBUTION_KEYWORDS: &[&str] = &[
    "distribution", "share", "proportion", "percentage", "percent", "breakdown", "composition",
];

impl ColumnRole {
    /// Infers a role from the column name, then from the driver type name.
    pub fn infer(column: &ColumnInfo) -> Option<Self> {
        Self::from_name(&column.name).or_else(|| Self::from_type(&column.data_type))
    }

    fn from_name(name: &str) -> Option<Self> {
        let tokens = tokens(name);
        let has = |set: &[&str]| tokens.iter().any(|t| set.contains(&t.as_str()));
        if has(DATE_TOKENS) {
            Some(Self::DateTime)
        } else if has(NUMERIC_TOKENS) {
            Some(Self::Numeric)
        } else if has(CATEGORY_TOKENS) {
            Some(Self::Category)
        } else {
            None
        }
    }

    fn from_type(data_type: &str) -> Option<Self> {
        let t = data_type.to_uppercase();
        if t.is_empty() {
            None
        } else if t.contains("DATE") || t.contains("TIME") {
            Some(Self::DateTime)
        } else if ["INT", "FLOAT", "DOUBLE", "REAL", "NUMERIC", "DECIMAL"]
            .iter()
            .any(|n| t.contains(n))
        {
            Some(Self::Numeric)
        } else if ["TEXT", "CHAR", "ENUM", "NAME"].iter().any(|n| t.contains(n)) {
            Some(Self::Category)
        } else {
            None
        }
    }
}

/// Picks a chart kind. Rules are tried in order and the first match wins:
///
/// 1. date column and a trend keyword: line
/// 2. category column and a comparison keyword: bar
/// 3. numeric column and a distribution keyword: pie
/// 4. category column: bar
/// 5. date column: line
/// 6. otherwise bar
///
/// Never returns `Card`; that kind is only used when a caller asks for it.
pub fn classify(question: &str, columns: &[ColumnInfo]) -> ChartKind {
    let roles: Vec<ColumnRole> = columns.iter().filter_map(ColumnRole::infer).collect();
    let has_role = |role: ColumnRole| roles.contains(&role);
    let question = normalize(question);
    let mentions = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|k| question.contains(&format!(" {k} ")))
    };

    if has_role(ColumnRole::DateTime) && mentions(TREND_KEYWORDS) {
        ChartKind::Line
    } else if has_role(ColumnRole::Category) && mentions(COMPARISON_KEYWORDS) {
        ChartKind::Bar
    } else if has_role(ColumnRole::Numeric) && mentions(DISTRIBUTION_KEYWORDS) {
        ChartKind::Pie
    } else if has_role(ColumnRole::Category) {
        ChartKind::Bar
    } else if has_role(ColumnRole::DateTime) {
        ChartKind::Line
    } else {
        ChartKind::Bar
    }
}

/// Lowercase words separated by single spaces, padded at both ends.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    format!(" {} ", words.join(" "))
}

fn tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
