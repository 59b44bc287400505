//! Mock database client for testing.
//!
//! Tables are registered with their full contents. A query is answered by an
//! exact scripted response if one matches, else by the first registered table
//! whose name appears in the statement.

use super::{
    ColumnInfo, Column, DatabaseClient, DatabaseConnector, QueryResult, Table,
};
use crate::error::{DataVizError, Result};
use crate::registry::ConnectionRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A mock database client that returns predefined results.
#[derive(Clone, Default)]
pub struct MockDatabaseClient {
    tables: BTreeMap<String, QueryResult>,
    responses: Vec<(String, QueryResult)>,
    fail_queries: Option<String>,
    executed: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockDatabaseClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table and its rows.
    pub fn with_table(mut self, name: &str, contents: QueryResult) -> Self {
        self.tables.insert(name.to_string(), contents);
        self
    }

    /// Answers `sql` (compared ignoring case and surrounding whitespace) with `result`.
    pub fn with_response(mut self, sql: &str, result: QueryResult) -> Self {
        self.responses.push((normalize(sql), result));
        self
    }

    /// Makes every query fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_queries = Some(message.to_string());
        self
    }

    /// Number of statements executed.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_lowercase()
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_tables(&self, tables: &[String], sample_rows: usize) -> Result<Vec<Table>> {
        tables
            .iter()
            .map(|name| {
                let contents = self
                    .tables
                    .get(name)
                    .ok_or_else(|| DataVizError::reasoning(format!("relation \"{name}\" does not exist")))?;
                let columns = contents
                    .columns
                    .iter()
                    .map(|c: &ColumnInfo| Column::new(&c.name, &c.data_type, true))
                    .collect();
                let mut sample = contents.clone();
                sample.rows.truncate(sample_rows);
                Ok(Table {
                    name: name.clone(),
                    columns,
                    sample,
                })
            })
            .collect()
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.executed.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.fail_queries {
            return Err(DataVizError::reasoning(message.clone()));
        }

        let key = normalize(sql);
        if let Some((_, result)) = self.responses.iter().find(|(s, _)| *s == key) {
            return Ok(result.clone());
        }

        self.tables
            .iter()
            .find(|(name, _)| key.contains(&name.to_lowercase()))
            .map(|(_, contents)| contents.clone())
            .ok_or_else(|| DataVizError::reasoning(format!("no mock result for: {sql}")))
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that hands out clones of one mock client.
///
/// Clones share counters, so the original can be inspected after the fact.
#[derive(Clone, Default)]
pub struct MockConnector {
    client: MockDatabaseClient,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(client: MockDatabaseClient) -> Self {
        Self {
            client,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn client(&self) -> &MockDatabaseClient {
        &self.client
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseConnector for MockConnector {
    async fn connect(&self, _record: &ConnectionRecord) -> Result<Box<dyn DatabaseClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.client.clone()))
    }
}
