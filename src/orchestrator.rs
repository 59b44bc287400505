//! Query orchestrator.
//!
//! Runs one question through the pipeline:
//!
//! ```text
//! Received -> ConnectionValidated -> Reasoned -> Extracted -> Classified -> Formatted -> Responded
//! ```
//!
//! Stages run strictly in order. The first failure stops the request and is
//! returned unchanged together with the stage that failed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::db::{ColumnInfo, DatabaseConnector, QueryResult};
use crate::error::{DataVizError, Result};
use crate::extract::{extract, ResultRows};
use crate::reasoning::ReasoningAdapter;
use crate::registry::{ConnectionRecord, Registry};
use crate::safety::SqlGuard;
use crate::viz::{self, ChartAdvisor, ChartKind, ChartPayload};

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    ConnectionValidated,
    Reasoned,
    Extracted,
    Classified,
    Formatted,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::ConnectionValidated => "connection_validated",
            Self::Reasoned => "reasoned",
            Self::Extracted => "extracted",
            Self::Classified => "classified",
            Self::Formatted => "formatted",
            Self::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// A request that stopped before `Responded`.
///
/// `stage` is the stage the pipeline was trying to reach.
#[derive(Debug)]
pub struct QueryFailure {
    pub stage: Stage,
    pub error: DataVizError,
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.error, self.stage)
    }
}

impl From<QueryFailure> for DataVizError {
    fn from(failure: QueryFailure) -> Self {
        failure.error
    }
}

/// A question against a saved connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub connection_id: String,
    /// Chart kind requested by the caller; replaces the classifier's choice.
    #[serde(default, alias = "chart_type")]
    pub chart_override: Option<ChartKind>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            connection_id: connection_id.into(),
            chart_override: None,
        }
    }

    pub fn with_chart(mut self, kind: ChartKind) -> Self {
        self.chart_override = Some(kind);
        self
    }
}

/// Everything a successful request returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub sql: String,
    pub columns: Vec<ColumnInfo>,
    /// Rows keyed by column name.
    pub rows: Vec<Map<String, JsonValue>>,
    pub chart: ChartPayload,
    /// The engine's final free-text answer.
    pub answer: String,
    /// Advisory chart kind from the LLM, if enabled and understood.
    pub suggested_chart: Option<ChartKind>,
    /// True when the statement returned no rows.
    pub empty: bool,
}

/// Composes registry, reasoning, extraction and visualization.
pub struct Orchestrator {
    registry: Arc<Registry>,
    reasoning: ReasoningAdapter,
    connector: Arc<dyn DatabaseConnector>,
    advisor: Option<ChartAdvisor>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        reasoning: ReasoningAdapter,
        connector: Arc<dyn DatabaseConnector>,
    ) -> Self {
        Self {
            registry,
            reasoning,
            connector,
            advisor: None,
        }
    }

    pub fn with_advisor(mut self, advisor: ChartAdvisor) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Runs one request through every stage.
    pub async fn run(&self, request: &QueryRequest) -> std::result::Result<QueryResponse, QueryFailure> {
        let start = Instant::now();
        debug!(stage = %Stage::Received, connection = %request.connection_id, "query received");

        let connection = self
            .registry
            .checkout(&request.connection_id)
            .await
            .map_err(fail(Stage::ConnectionValidated))?;
        debug!(stage = %Stage::ConnectionValidated, "{}", connection.display_string());

        let trace = self
            .reasoning
            .reason(&request.question, &connection)
            .await
            .map_err(fail(Stage::Reasoned))?;
        debug!(stage = %Stage::Reasoned, steps = trace.steps.len());

        let extracted = extract(&trace).map_err(fail(Stage::Extracted))?;
        let result = self
            .materialise(&connection, &extracted.sql, extracted.rows)
            .await
            .map_err(fail(Stage::Extracted))?;
        debug!(stage = %Stage::Extracted, rows = result.row_count(), sql = %extracted.sql);

        let kind = request
            .chart_override
            .unwrap_or_else(|| viz::classify(&request.question, &result.columns));
        debug!(stage = %Stage::Classified, chart = %kind);

        let chart = viz::format(&result, kind);
        debug!(stage = %Stage::Formatted);

        let suggested_chart = match &self.advisor {
            Some(advisor) => advisor.suggest(&trace.output).await,
            None => None,
        };

        info!(
            chart = %kind,
            rows = result.row_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query answered"
        );
        debug!(stage = %Stage::Responded);

        Ok(QueryResponse {
            sql: extracted.sql,
            rows: result.records(),
            empty: result.is_empty(),
            columns: result.columns,
            chart,
            answer: trace.output,
            suggested_chart,
        })
    }

    /// Turns extracted rows into a result, re-running the statement when the
    /// trace only carried text.
    async fn materialise(
        &self,
        connection: &ConnectionRecord,
        sql: &str,
        rows: ResultRows,
    ) -> Result<QueryResult> {
        match rows {
            ResultRows::Observed(result) => Ok(result),
            ResultRows::Empty => Ok(QueryResult::new()),
            ResultRows::Deferred(_) => {
                let verdict = SqlGuard::for_backend(connection.kind).check(sql);
                if !verdict.is_read_only() {
                    return Err(DataVizError::no_query(format!(
                        "extracted statement is not a read-only query ({})",
                        verdict.statement_type
                    )));
                }
                debug!("re-executing extracted statement for rows");
                let client = self.connector.connect(connection).await.map_err(as_reasoning)?;
                let outcome = client.execute_query(sql).await.map_err(as_reasoning);
                if let Err(e) = client.close().await {
                    debug!("close after re-execution failed: {}", e);
                }
                outcome
            }
        }
    }
}

fn fail(stage: Stage) -> impl FnOnce(DataVizError) -> QueryFailure {
    move |error| {
        debug!(%stage, kind = ?error.kind(), "query failed");
        QueryFailure { stage, error }
    }
}

fn as_reasoning(err: DataVizError) -> DataVizError {
    match err {
        DataVizError::ReasoningEngine(_) => err,
        other => DataVizError::reasoning(other.to_string()),
    }
}
