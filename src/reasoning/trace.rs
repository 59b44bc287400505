//! Execution trace model.
//!
//! Engines report what they did as a loosely-typed list of steps. The raw
//! JSON is read tolerantly and then pinned down into a closed set of variants
//! so the extractor never has to poke at ad-hoc fields.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::db::QueryResult;
use crate::error::{DataVizError, Result};

/// Tool that executes SQL inside the agent.
pub const QUERY_TOOL: &str = "sql_db_query";

/// Tool that re-runs the final statement to materialise rows for a chart.
pub const VIZ_QUERY_TOOL: &str = "sql_db_query_for_viz";

/// Returns true if `tool` executes SQL.
pub fn is_query_tool(tool: &str) -> bool {
    let tool = tool.trim();
    tool.eq_ignore_ascii_case(QUERY_TOOL) || tool.eq_ignore_ascii_case(VIZ_QUERY_TOOL)
}

/// What the engine asked a tool to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A call to a SQL execution tool.
    Query { tool: String, input: String },
    /// Anything else: listing tables, reading schema, checking a query.
    Other { tool: String, input: String },
}

impl Action {
    /// Classifies a tool call by its tool name.
    pub fn new(tool: impl Into<String>, input: impl Into<String>) -> Self {
        let tool = tool.into();
        let input = input.into();
        if is_query_tool(&tool) {
            Self::Query { tool, input }
        } else {
            Self::Other { tool, input }
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::Query { tool, .. } | Self::Other { tool, .. } => tool,
        }
    }

    pub fn input(&self) -> &str {
        match self {
            Self::Query { input, .. } | Self::Other { input, .. } => input,
        }
    }
}

/// What the tool returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Structured rows.
    Rows(QueryResult),
    /// Free text, possibly a textual rendering of rows.
    Text(String),
    /// The engine reported no output for this step.
    Missing,
}

impl Observation {
    fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Missing,
            JsonValue::String(s) => Self::Text(s.clone()),
            JsonValue::Array(_) => QueryResult::from_json_rows(value)
                .map(Self::Rows)
                .unwrap_or_else(|| Self::Text(value.to_string())),
            other => Self::Text(other.to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Rows(result) => serde_json::to_string(&result.records()).unwrap_or_default(),
            Self::Text(text) => text.clone(),
            Self::Missing => String::new(),
        }
    }
}

/// One action/observation pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    pub action: Action,
    pub observation: Observation,
    /// The engine's reasoning text leading to this action, if reported.
    pub log: Option<String>,
}

impl TraceStep {
    pub fn new(action: Action, observation: Observation) -> Self {
        Self {
            action,
            observation,
            log: None,
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }
}

/// Everything one reasoning call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    pub steps: Vec<TraceStep>,
    /// Final free-text answer.
    pub output: String,
}

impl ExecutionTrace {
    pub fn new(steps: Vec<TraceStep>, output: impl Into<String>) -> Self {
        Self {
            steps,
            output: output.into(),
        }
    }

    /// Reads an engine response. Unknown fields are ignored and missing ones
    /// default; only a body that is not a JSON object at all is rejected.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        let raw: RawTrace = serde_json::from_value(value)
            .map_err(|e| DataVizError::reasoning(format!("Malformed execution trace: {e}")))?;
        Ok(raw.into_trace())
    }

    /// Text rendering of the whole trace in the agent's transcript layout.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            if let Some(log) = &step.log {
                out.push_str(log.trim_end());
                out.push('\n');
            }
            out.push_str(&format!(
                "Action: {}\nAction Input: {}\nObservation: {}\n",
                step.action.tool(),
                step.action.input(),
                step.observation.render()
            ));
        }
        if !self.output.is_empty() {
            out.push_str("Final Answer: ");
            out.push_str(&self.output);
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct RawTrace {
    #[serde(default, alias = "intermediate_steps")]
    steps: Vec<RawStep>,
    #[serde(default, alias = "result")]
    output: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Pair(JsonValue, JsonValue),
    Object {
        #[serde(default)]
        action: JsonValue,
        #[serde(default)]
        observation: JsonValue,
    },
    Bare(JsonValue),
}

impl RawStep {
    fn into_step(self) -> TraceStep {
        let (action, observation) = match self {
            Self::Pair(action, observation) => (action, observation),
            Self::Object {
                action,
                observation,
            } => (action, observation),
            Self::Bare(action) => (action, JsonValue::Null),
        };
        let (action, log) = read_action(action);
        TraceStep {
            action,
            observation: Observation::from_json(&observation),
            log,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAction {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default, alias = "input")]
    tool_input: JsonValue,
    #[serde(default)]
    log: Option<String>,
}

impl RawAction {
    /// Tool inputs arrive as a plain string or as an argument object.
    fn input_text(&self) -> String {
        match &self.tool_input {
            JsonValue::Null => String::new(),
            JsonValue::String(s) => s.clone(),
            JsonValue::Object(map) => map
                .get("query")
                .or_else(|| map.get("tool_input"))
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.tool_input.to_string()),
            other => other.to_string(),
        }
    }
}

/// Reads one step's action.
///
/// Anything that is not an action object (an engine that stringified its
/// action, a bare number) becomes an untooled action whose input is the text,
/// so the transcript still carries it.
fn read_action(value: JsonValue) -> (Action, Option<String>) {
    match value {
        JsonValue::Null => (Action::new("", ""), None),
        JsonValue::Object(_) => {
            let text = value.to_string();
            match serde_json::from_value::<RawAction>(value) {
                Ok(raw) => (
                    Action::new(raw.tool.clone().unwrap_or_default(), raw.input_text()),
                    raw.log,
                ),
                Err(_) => (Action::new("", text), None),
            }
        }
        // Stringified actions keep newlines escaped.
        JsonValue::String(text) => (Action::new("", text.replace("\\n", "\n")), None),
        other => (Action::new("", other.to_string()), None),
    }
}

impl RawTrace {
    fn into_trace(self) -> ExecutionTrace {
        let steps = self.steps.into_iter().map(RawStep::into_step).collect();

        let output = match self.output {
            JsonValue::Null => String::new(),
            JsonValue::String(s) => s,
            other => other.to_string(),
        };

        ExecutionTrace { steps, output }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_action_classification() {
        assert!(matches!(Action::new("sql_db_query", "SELECT 1"), Action::Query { .. }));
        assert!(matches!(Action::new("sql_db_query_for_viz", "SELECT 1"), Action::Query { .. }));
        assert!(matches!(Action::new("sql_db_schema", "sales"), Action::Other { .. }));
        assert!(matches!(Action::new("", ""), Action::Other { .. }));
    }

    #[test]
    fn test_parse_object_steps() {
        let trace = ExecutionTrace::from_json(json!({
            "intermediate_steps": [
                {
                    "action": {"tool": "sql_db_list_tables", "tool_input": "", "log": "I should look"},
                    "observation": "sales"
                },
                {
                    "action": {"tool": "sql_db_query", "tool_input": {"query": "SELECT 1"}},
                    "observation": [{"n": 1}]
                }
            ],
            "output": "one"
        }))
        .unwrap();

        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[0].log.as_deref(), Some("I should look"));
        assert_eq!(trace.steps[0].observation, Observation::Text("sales".to_string()));
        assert_eq!(trace.steps[1].action, Action::new("sql_db_query", "SELECT 1"));
        match &trace.steps[1].observation {
            Observation::Rows(result) => assert_eq!(result.row_count(), 1),
            other => panic!("expected rows, got {other:?}"),
        }
        assert_eq!(trace.output, "one");
    }

    #[test]
    fn test_parse_pair_steps_and_missing_fields() {
        let trace = ExecutionTrace::from_json(json!({
            "steps": [
                [{"tool": "sql_db_query", "tool_input": "SELECT 2"}, null],
                [{"tool_input": "orphan"}, 42],
                {"observation": "no action"}
            ]
        }))
        .unwrap();

        assert_eq!(trace.steps.len(), 3);
        assert_eq!(trace.steps[0].observation, Observation::Missing);
        assert_eq!(trace.steps[1].action, Action::new("", "orphan"));
        assert_eq!(trace.steps[1].observation, Observation::Text("42".to_string()));
        assert_eq!(trace.steps[2].action.tool(), "");
        assert_eq!(trace.output, "");
    }

    #[test]
    fn test_stringified_actions_are_kept_as_text() {
        let trace = ExecutionTrace::from_json(json!({
            "intermediate_steps": [
                [
                    "tool='sql_db_query' tool_input='SELECT product FROM sales' log='Action: sql_db_query\\nAction Input: SELECT product FROM sales\\n'",
                    "[('widget',)]"
                ],
                "Thought: that answers it",
                7
            ],
            "output": "widgets sell best"
        }))
        .unwrap();

        assert_eq!(trace.steps.len(), 3);
        assert_eq!(trace.steps[0].action.tool(), "");
        assert!(trace.steps[0]
            .action
            .input()
            .contains("Action Input: SELECT product FROM sales\n"));
        assert_eq!(trace.steps[1].observation, Observation::Missing);
        assert_eq!(trace.steps[2].action.input(), "7");

        let found = crate::extract::extract(&trace).unwrap();
        assert_eq!(found.sql, "SELECT product FROM sales");
        assert_eq!(found.source, crate::extract::ExtractionSource::TextScan);
    }

    #[test]
    fn test_action_object_with_odd_fields_is_kept_as_text() {
        let trace = ExecutionTrace::from_json(json!({
            "steps": [{"action": {"tool": 5, "tool_input": "SELECT 1"}, "observation": "1"}]
        }))
        .unwrap();
        assert_eq!(trace.steps[0].action.tool(), "");
        assert!(trace.steps[0].action.input().contains("SELECT 1"));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let err = ExecutionTrace::from_json(json!("just text")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ReasoningEngineError);
    }

    #[test]
    fn test_flatten_layout() {
        let trace = ExecutionTrace::new(
            vec![TraceStep::new(
                Action::new("sql_db_schema", "sales"),
                Observation::Text("CREATE TABLE sales".to_string()),
            )
            .with_log("Thought: read the schema")],
            "done",
        );
        assert_eq!(
            trace.flatten(),
            "Thought: read the schema\nAction: sql_db_schema\nAction Input: sales\nObservation: CREATE TABLE sales\nFinal Answer: done"
        );
    }
}
