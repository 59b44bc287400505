//! End-to-end question answering through the service facade, with scripted
//! LLM replies and an in-memory database.

use dataviz_agent::api::{DataViz, Envelope};
use dataviz_agent::codec::{AesGcmCodec, EncryptionKey};
use dataviz_agent::config::ReasoningConfig;
use dataviz_agent::db::{ColumnInfo, MockConnector, MockDatabaseClient, QueryResult, Value};
use dataviz_agent::error::{ErrorKind, ProbeFailure};
use dataviz_agent::llm::MockLlmClient;
use dataviz_agent::orchestrator::{Orchestrator, QueryRequest};
use dataviz_agent::probe::MockProber;
use dataviz_agent::reasoning::{
    ExecutionTrace, MockReasoningEngine, ReasoningAdapter, ReasoningEngine, SqlAgent,
};
use dataviz_agent::registry::{MemoryStore, NewConnection, Registry};
use dataviz_agent::viz::{ChartAdvisor, ChartData, ChartKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn monthly_sales() -> QueryResult {
    QueryResult::with_data(
        vec![
            ColumnInfo::new("month", "DATE"),
            ColumnInfo::new("total_sales", "NUMERIC"),
        ],
        vec![
            vec![Value::from("2024-03-01"), Value::Float(310.0)],
            vec![Value::from("2024-01-01"), Value::Float(120.0)],
            vec![Value::from("2024-02-01"), Value::Float(205.5)],
        ],
    )
}

fn connection(host: &str) -> NewConnection {
    NewConnection {
        name: "warehouse".to_string(),
        kind: "postgresql".to_string(),
        host: host.to_string(),
        port: 5432,
        database: "sales".to_string(),
        username: "analyst".to_string(),
        password: "pw".to_string(),
        ssl: None,
    }
}

struct Harness {
    api: DataViz,
    prober: Arc<MockProber>,
    db: MockDatabaseClient,
}

fn harness(
    engine: Arc<dyn ReasoningEngine>,
    db: MockDatabaseClient,
    advisor: Option<MockLlmClient>,
) -> Harness {
    let prober = Arc::new(MockProber::new());
    let registry = Arc::new(Registry::new(
        Arc::new(MemoryStore::new()),
        Arc::new(AesGcmCodec::new(&EncryptionKey::from_bytes([5u8; 32]))),
        prober.clone(),
    ));
    let mut orchestrator = Orchestrator::new(
        registry.clone(),
        ReasoningAdapter::new(engine, &ReasoningConfig::default()),
        Arc::new(MockConnector::new(db.clone())),
    );
    if let Some(llm) = advisor {
        orchestrator = orchestrator.with_advisor(ChartAdvisor::new(Arc::new(llm)));
    }
    Harness {
        api: DataViz::from_parts(registry, orchestrator),
        prober,
        db,
    }
}

fn agent_harness(llm: MockLlmClient, advisor: Option<MockLlmClient>) -> Harness {
    let db = MockDatabaseClient::new().with_table("monthly_sales", monthly_sales());
    let agent = SqlAgent::new(Arc::new(llm), Arc::new(MockConnector::new(db.clone())), 8);
    harness(Arc::new(agent), db, advisor)
}

#[tokio::test]
async fn test_agent_answers_trend_question_with_line_chart() {
    let llm = MockLlmClient::new()
        .with_reply("Thought: check the tables\nAction: sql_db_list_tables\nAction Input: ")
        .with_reply(
            "Thought: query monthly totals\nAction: sql_db_query\nAction Input: SELECT month, total_sales FROM monthly_sales",
        )
        .with_reply("Thought: I now know the final answer\nFinal Answer: Sales rose every month.");
    let h = agent_harness(llm, None);
    let id = h.api.add_connection(connection("db")).await.unwrap().id;

    let response = h
        .api
        .run_query(QueryRequest::new("show the monthly sales trend", id))
        .await
        .unwrap();

    assert_eq!(response.sql, "SELECT month, total_sales FROM monthly_sales");
    assert_eq!(response.chart.kind, ChartKind::Line);
    assert_eq!(
        response.chart.data,
        ChartData::Series {
            x: vec![
                "2024-01-01".to_string(),
                "2024-02-01".to_string(),
                "2024-03-01".to_string()
            ],
            y: vec![Some(120.0), Some(205.5), Some(310.0)],
        }
    );
    assert_eq!(response.rows.len(), 3);
    assert_eq!(response.answer, "Sales rose every month.");
    assert!(!response.empty);
}

#[tokio::test]
async fn test_response_envelope_shape() {
    let llm = MockLlmClient::new()
        .with_reply("Action: sql_db_query\nAction Input: SELECT month, total_sales FROM monthly_sales")
        .with_reply("Final Answer: done");
    let advisor = MockLlmClient::new().with_fallback("area");
    let h = agent_harness(llm, Some(advisor));
    let id = h.api.add_connection(connection("db")).await.unwrap().id;

    let result = h
        .api
        .run_query(QueryRequest::new("sales", id).with_chart(ChartKind::Card))
        .await;
    let json = serde_json::to_value(Envelope::from_result(result)).unwrap();

    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["chart"]["kind"], "card");
    assert_eq!(json["data"]["chart"]["data"]["shape"], "summary");
    assert_eq!(json["data"]["suggested_chart"], "line");
    assert_eq!(json["data"]["rows"][0]["total_sales"], json!(310.0));
}

#[tokio::test]
async fn test_validation_failure_is_reported_before_reasoning() {
    let engine = MockReasoningEngine::new();
    let h = harness(Arc::new(engine.clone()), MockDatabaseClient::new(), None);
    let id = h.api.add_connection(connection("db")).await.unwrap().id;
    h.prober.fail_host("db", ProbeFailure::SslRequired, "server requires SSL");

    let result = h.api.run_query(QueryRequest::new("anything", id)).await;
    let envelope = Envelope::from_result(result);
    assert!(!envelope.is_success());
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["kind"], "SSLRequired");
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_engine_trace_with_text_observation_is_re_executed() {
    let trace = ExecutionTrace::from_json(json!({
        "intermediate_steps": [
            [
                {"tool": "sql_db_query", "tool_input": "SELECT month, total_sales FROM monthly_sales", "log": ""},
                "[('2024-03-01', 310.0), ('2024-01-01', 120.0)]"
            ]
        ],
        "output": "Three months of sales."
    }))
    .unwrap();
    let db = MockDatabaseClient::new().with_table("monthly_sales", monthly_sales());
    let h = harness(
        Arc::new(MockReasoningEngine::new().with_default(trace)),
        db,
        None,
    );
    let id = h.api.add_connection(connection("db")).await.unwrap().id;

    let response = h
        .api
        .run_query(QueryRequest::new("compare months", id))
        .await
        .unwrap();

    assert_eq!(h.db.executed(), 1);
    assert_eq!(h.db.closed(), 1);
    assert_eq!(response.rows.len(), 3);
}

#[tokio::test]
async fn test_agent_without_query_reports_no_query_found() {
    let llm = MockLlmClient::new().with_reply("Final Answer: I cannot answer that.");
    let h = agent_harness(llm, None);
    let id = h.api.add_connection(connection("db")).await.unwrap().id;

    let err = h
        .api
        .run_query(QueryRequest::new("what is the meaning of life", id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoQueryFound);
}

#[tokio::test]
async fn test_empty_result_is_success() {
    let empty = QueryResult::with_data(
        vec![ColumnInfo::new("month", "DATE"), ColumnInfo::new("total_sales", "NUMERIC")],
        vec![],
    );
    let db = MockDatabaseClient::new().with_table("monthly_sales", empty);
    let llm = MockLlmClient::new()
        .with_reply("Action: sql_db_query\nAction Input: SELECT month, total_sales FROM monthly_sales WHERE 1 = 0")
        .with_reply("Final Answer: There is no data.");
    let agent = SqlAgent::new(Arc::new(llm), Arc::new(MockConnector::new(db.clone())), 8);
    let h = harness(Arc::new(agent), db, None);
    let id = h.api.add_connection(connection("db")).await.unwrap().id;

    let response = h
        .api
        .run_query(QueryRequest::new("monthly trend", id))
        .await
        .unwrap();
    assert!(response.empty);
    assert!(response.rows.is_empty());
    assert!(response.chart.is_empty());
}
