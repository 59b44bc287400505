//! Chart selection and shaping.
//!
//! [`classify`] picks a chart kind from the question and the result columns;
//! [`format`] reshapes the rows into that kind's schema. Both are pure.

mod advisor;
mod classify;
mod format;

pub use advisor::ChartAdvisor;
pub use classify::{classify, ColumnRole};
pub use format::format;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DataVizError, Result};

/// Chart shapes the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
    /// Plain-text summary of the rows.
    Card,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Bar => "bar",
            Self::Pie => "pie",
            Self::Card => "card",
        }
    }

    /// Maps a free-text chart name to a kind. Close relatives are folded in
    /// (`area` is drawn as a line, `donut` as a pie); anything else is `None`.
    pub fn from_suggestion(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        text.split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|word| match word {
                "line" | "area" => Some(Self::Line),
                "bar" | "column" => Some(Self::Bar),
                "pie" | "donut" | "doughnut" => Some(Self::Pie),
                "card" => Some(Self::Card),
                _ => None,
            })
    }
}

impl FromStr for ChartKind {
    type Err = DataVizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "line" | "area" => Ok(Self::Line),
            "bar" => Ok(Self::Bar),
            "pie" | "donut" => Ok(Self::Pie),
            "card" => Ok(Self::Card),
            other => Err(DataVizError::config(format!(
                "Unknown chart kind '{other}', expected line, bar, pie or card"
            ))),
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled value of a bar or pie chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryValue {
    pub label: String,
    pub value: Option<f64>,
}

/// Kind-specific chart payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "values", rename_all = "snake_case")]
pub enum ChartData {
    /// No rows to draw.
    Empty,
    /// Bar and pie.
    Categories(Vec<CategoryValue>),
    /// Line: x categories in ascending order with their y values.
    Series { x: Vec<String>, y: Vec<Option<f64>> },
    /// Card.
    Summary(String),
}

/// A chart kind with its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    pub kind: ChartKind,
    pub data: ChartData,
}

impl ChartPayload {
    pub fn empty(kind: ChartKind) -> Self {
        Self {
            kind,
            data: ChartData::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.data, ChartData::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_suggestion() {
        assert_eq!(ChartKind::from_suggestion("line"), Some(ChartKind::Line));
        assert_eq!(ChartKind::from_suggestion("Area chart."), Some(ChartKind::Line));
        assert_eq!(ChartKind::from_suggestion("donut"), Some(ChartKind::Pie));
        assert_eq!(ChartKind::from_suggestion("a bar chart"), Some(ChartKind::Bar));
        assert_eq!(ChartKind::from_suggestion("card"), Some(ChartKind::Card));
        assert_eq!(ChartKind::from_suggestion("scatter"), None);
        assert_eq!(ChartKind::from_suggestion("pipeline"), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Pie".parse::<ChartKind>().unwrap(), ChartKind::Pie);
        assert!("heatmap".parse::<ChartKind>().is_err());
    }

    #[test]
    fn test_chart_payload_serialization() {
        let chart = ChartPayload {
            kind: ChartKind::Bar,
            data: ChartData::Categories(vec![CategoryValue {
                label: "A".to_string(),
                value: Some(2.0),
            }]),
        };
        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["kind"], "bar");
        assert_eq!(json["data"]["shape"], "categories");
        assert_eq!(json["data"]["values"][0]["label"], "A");

        let empty = serde_json::to_value(ChartPayload::empty(ChartKind::Line)).unwrap();
        assert_eq!(empty["data"]["shape"], "empty");
    }
}
