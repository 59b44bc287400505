//! Table descriptions used to ground the reasoning engine.

use super::QueryResult;
use serde::{Deserialize, Serialize};

/// A table with its columns and a few example rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// First rows of the table, at most the configured sample size.
    pub sample: QueryResult,
}

/// A column in a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable,
        }
    }
}

impl Table {
    /// Formats the table as DDL followed by a comment block of sample rows.
    ///
    /// ```text
    /// CREATE TABLE sales (
    ///     date date NOT NULL,
    ///     total_sales numeric
    /// )
    ///
    /// /*
    /// 3 rows from sales table:
    /// date	total_sales
    /// 2024-01-01	10
    /// */
    /// ```
    pub fn format_for_prompt(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.is_nullable { "" } else { " NOT NULL" };
                format!("\t{} {}{}", c.name, c.data_type, null)
            })
            .collect::<Vec<_>>()
            .join(",\n");

        let mut out = format!("CREATE TABLE {} (\n{}\n)", self.name, columns);

        if !self.sample.columns.is_empty() {
            let header = self
                .sample
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join("\t");
            let rows = self
                .sample
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|v| truncate(&v.to_display_string(), 100))
                        .collect::<Vec<_>>()
                        .join("\t")
                })
                .collect::<Vec<_>>()
                .join("\n");
            out.push_str(&format!(
                "\n\n/*\n{} rows from {} table:\n{}\n{}\n*/",
                self.sample.rows.len(),
                self.name,
                header,
                rows
            ));
        }

        out
    }
}

/// Formats several tables separated by blank lines.
pub fn format_tables(tables: &[Table]) -> String {
    tables
        .iter()
        .map(Table::format_for_prompt)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, Value};

    #[test]
    fn test_format_with_sample_rows() {
        let table = Table {
            name: "sales".into(),
            columns: vec![
                Column::new("date", "date", false),
                Column::new("total_sales", "numeric", true),
            ],
            sample: QueryResult::with_data(
                vec![ColumnInfo::new("date", "DATE"), ColumnInfo::new("total_sales", "NUMERIC")],
                vec![vec![Value::from("2024-01-01"), Value::Int(10)]],
            ),
        };

        let text = table.format_for_prompt();
        assert!(text.starts_with("CREATE TABLE sales (\n\tdate date NOT NULL,\n\ttotal_sales numeric\n)"));
        assert!(text.contains("1 rows from sales table:"));
        assert!(text.contains("2024-01-01\t10"));
    }

    #[test]
    fn test_format_without_sample() {
        let table = Table {
            name: "empty".into(),
            columns: vec![Column::new("id", "integer", false)],
            sample: QueryResult::new(),
        };
        assert!(!table.format_for_prompt().contains("rows from"));
    }

    #[test]
    fn test_truncate_long_values() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
