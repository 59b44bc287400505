//! MySQL database client implementation.

use crate::db::{
    Column, ColumnInfo, DatabaseClient, QueryResult, Row, Table, Value, MAX_ROWS,
    QUERY_TIMEOUT_SECS,
};
use crate::error::{DataVizError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    /// Connects with a `mysql://` URI.
    pub async fn connect(uri: &str) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(uri)
            .map_err(|e| DataVizError::config(format!("Invalid connection string: {e}")))?;
        Self::connect_with(options).await
    }

    /// Connects with prebuilt options.
    pub async fn connect_with(options: MySqlConnectOptions) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| DataVizError::reasoning(format!("Failed to connect to database: {e}")))?;
        debug!("Connected to MySQL");
        Ok(Self { pool })
    }

    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<Column>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT CAST(column_name AS CHAR), CAST(column_type AS CHAR), CAST(is_nullable AS CHAR)
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ordinal_position
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DataVizError::reasoning(format!("Failed to fetch columns for {table_name}: {e}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable)| Column::new(name, data_type, is_nullable == "YES"))
            .collect())
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT CAST(table_name AS CHAR)
            FROM information_schema.tables
            WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DataVizError::reasoning(format!("Failed to fetch tables: {e}")))
    }

    async fn describe_tables(&self, tables: &[String], sample_rows: usize) -> Result<Vec<Table>> {
        let mut described = Vec::with_capacity(tables.len());
        for name in tables {
            let columns = self.fetch_columns(name).await?;
            let sample = if sample_rows > 0 {
                let sql = format!("SELECT * FROM {} LIMIT {sample_rows}", quote_ident(name));
                self.execute_query(&sql).await?
            } else {
                QueryResult::new()
            };
            described.push(Table {
                name: name.clone(),
                columns,
                sample,
            });
        }
        Ok(described)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            DataVizError::reasoning(format!("Query timed out after {QUERY_TIMEOUT_SECS} seconds"))
        })?
        .map_err(|e| match e.as_database_error() {
            Some(db_err) => DataVizError::reasoning(format!("ERROR: {}", db_err.message())),
            None => DataVizError::reasoning(e.to_string()),
        })?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let was_truncated = result.len() > MAX_ROWS;
        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                result.len(),
                MAX_ROWS
            );
        }

        let rows: Vec<Row> = result.iter().take(MAX_ROWS).map(convert_row).collect();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let upper = type_name.to_uppercase();
    let unsigned = upper.ends_with("UNSIGNED");

    match upper.trim_end_matches(" UNSIGNED") {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" if unsigned => row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map(|v| i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64)))
            .unwrap_or(Value::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "DECIMAL" => row
            .try_get::<Option<Decimal>, _>(index)
            .ok()
            .flatten()
            .and_then(|d| d.to_f64())
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),

        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),

        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("sales"), "`sales`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[tokio::test]
    async fn test_execute_select_query() {
        let Some(url) = std::env::var("MYSQL_URL").ok() else {
            eprintln!("Skipping test: MYSQL_URL not set");
            return;
        };
        let client = MySqlClient::connect(&url).await.unwrap();

        let result = client
            .execute_query("SELECT 1 AS num, 'hello' AS greeting")
            .await
            .unwrap();
        assert_eq!(result.columns[1].name, "greeting");
        assert_eq!(result.rows[0][0], Value::Int(1));

        client.close().await.unwrap();
    }
}
