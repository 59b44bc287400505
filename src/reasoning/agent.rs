//! In-process SQL agent.
//!
//! A ReAct loop over an [`LlmClient`]: the model answers in
//! `Thought / Action / Action Input` form, the agent runs the named tool and
//! feeds back an `Observation`, until the model gives a `Final Answer` or the
//! step budget runs out. Every tool call is recorded as a trace step.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::trace::QUERY_TOOL;
use super::{Action, ExecutionTrace, Observation, ReasoningEngine, ReasoningRequest, TraceStep};
use crate::db::{format_tables, resolve_tables, DatabaseClient, DatabaseConnector};
use crate::error::Result;
use crate::llm::{LlmClient, Transcript};
use crate::safety::SqlGuard;

const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
const SCHEMA_TOOL: &str = "sql_db_schema";

/// Output reported when the step budget is exhausted.
pub const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit.";

/// Longest observation sent back to the model.
const MAX_OBSERVATION_CHARS: usize = 4000;

/// Default number of rows a generated query should ask for.
const TOP_K: usize = 10;

const FINAL_ANSWER: &str = "Final Answer:";

/// SQL agent backed by a completion model and a live database client.
pub struct SqlAgent {
    llm: Arc<dyn LlmClient>,
    connector: Arc<dyn DatabaseConnector>,
    max_iterations: usize,
}

/// What the model asked for in one reply.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Act { thought: String, tool: String, input: String },
    Finish(String),
    Malformed,
}

impl SqlAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        connector: Arc<dyn DatabaseConnector>,
        max_iterations: usize,
    ) -> Self {
        Self {
            llm,
            connector,
            max_iterations: max_iterations.max(1),
        }
    }

    async fn drive(
        &self,
        client: &dyn DatabaseClient,
        request: &ReasoningRequest,
    ) -> Result<ExecutionTrace> {
        let tables = resolve_tables(client, request.table_allowlist.as_deref()).await?;
        let described = client
            .describe_tables(&tables, request.sample_rows_in_table_info)
            .await?;
        let guard = SqlGuard::for_backend(request.backend);

        let mut transcript = Transcript::new(
            system_prompt(request, &format_tables(&described)),
            &request.question,
        );
        let mut steps = Vec::new();

        for iteration in 0..self.max_iterations {
            let reply = self.llm.complete(transcript.messages()).await?;
            let reply = cut_at_observation(&reply);
            debug!(iteration, "agent reply received");

            let (action, observation, thought) = match parse_reply(reply) {
                Reply::Finish(answer) => {
                    return Ok(ExecutionTrace::new(steps, answer));
                }
                Reply::Act {
                    thought,
                    tool,
                    input,
                } => {
                    let observation = self
                        .run_tool(client, &guard, &tables, request, &tool, &input)
                        .await;
                    (Action::new(tool, input), observation, thought)
                }
                Reply::Malformed => (
                    Action::new("_Exception", "Invalid Format"),
                    Observation::Text(
                        "Invalid Format: reply with either an Action and Action Input, or a Final Answer."
                            .to_string(),
                    ),
                    reply.trim().to_string(),
                ),
            };

            transcript.record(reply, &render_observation(&observation));
            let mut step = TraceStep::new(action, observation);
            if !thought.is_empty() {
                step = step.with_log(thought);
            }
            steps.push(step);
        }

        warn!(
            max_iterations = self.max_iterations,
            "agent stopped at its iteration limit"
        );
        Ok(ExecutionTrace::new(steps, ITERATION_LIMIT_OUTPUT))
    }

    async fn run_tool(
        &self,
        client: &dyn DatabaseClient,
        guard: &SqlGuard,
        tables: &[String],
        request: &ReasoningRequest,
        tool: &str,
        input: &str,
    ) -> Observation {
        match tool {
            LIST_TABLES_TOOL => Observation::Text(tables.join(", ")),
            SCHEMA_TOOL => {
                let wanted: Vec<String> = input
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                if let Some(unknown) = wanted.iter().find(|t| !tables.contains(t)) {
                    return Observation::Text(format!(
                        "Error: table_names {{{unknown}}} not found in database"
                    ));
                }
                match client
                    .describe_tables(&wanted, request.sample_rows_in_table_info)
                    .await
                {
                    Ok(described) => Observation::Text(format_tables(&described)),
                    Err(e) => Observation::Text(format!("Error: {e}")),
                }
            }
            QUERY_TOOL => {
                let sql = clean_sql(input);
                let verdict = guard.check(&sql);
                if !verdict.is_read_only() {
                    return Observation::Text(format!(
                        "Error: only read-only queries may run here, got {}",
                        verdict.statement_type
                    ));
                }
                match client.execute_query(&sql).await {
                    Ok(result) => Observation::Rows(result),
                    Err(e) => Observation::Text(format!("Error: {e}")),
                }
            }
            other => Observation::Text(format!(
                "{other} is not a valid tool, try one of [{QUERY_TOOL}, {SCHEMA_TOOL}, {LIST_TABLES_TOOL}]."
            )),
        }
    }
}

#[async_trait]
impl ReasoningEngine for SqlAgent {
    async fn run(&self, request: &ReasoningRequest) -> Result<ExecutionTrace> {
        let client = self.connector.connect(&request.connection).await?;
        let outcome = self.drive(client.as_ref(), request).await;
        if let Err(e) = client.close().await {
            warn!("failed to close agent connection: {}", e);
        }
        outcome
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}

fn system_prompt(request: &ReasoningRequest, table_info: &str) -> String {
    let dialect = match request.backend {
        crate::registry::BackendKind::Postgres => "PostgreSQL",
        crate::registry::BackendKind::MySql => "MySQL",
        crate::registry::BackendKind::Mongo => "SQL",
    };
    format!(
        "You are an agent designed to interact with a SQL database.\n\
Given an input question, create a syntactically correct {dialect} query to run, then look at the results of the query and return the answer.\n\
Unless the user specifies a specific number of examples they wish to obtain, always limit your query to at most {TOP_K} results.\n\
Only ask for the relevant columns given the question. Name aggregate columns descriptively, e.g. total_sales.\n\
Never run INSERT, UPDATE, DELETE, DROP or any other statement that changes data.\n\n\
Tables:\n\n{table_info}\n\n\
You have access to the following tools:\n\
{QUERY_TOOL}: Input is a detailed and correct SQL query, output is a result from the database.\n\
{SCHEMA_TOOL}: Input is a comma-separated list of tables, output is the schema and sample rows for those tables.\n\
{LIST_TABLES_TOOL}: Input is an empty string, output is a comma separated list of tables in the database.\n\n\
Use the following format:\n\n\
Thought: you should always think about what to do\n\
Action: the action to take, should be one of [{QUERY_TOOL}, {SCHEMA_TOOL}, {LIST_TABLES_TOOL}]\n\
Action Input: the input to the action\n\
Observation: the result of the action\n\
... (this Thought/Action/Action Input/Observation can repeat N times)\n\
Thought: I now know the final answer\n\
{FINAL_ANSWER} the final answer to the original input question"
    )
}

/// Models sometimes run on and invent the observation themselves.
fn cut_at_observation(reply: &str) -> &str {
    match reply.find("\nObservation:") {
        Some(idx) => &reply[..idx],
        None => reply,
    }
}

fn action_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)").ok()
    })
    .as_ref()
}

fn parse_reply(reply: &str) -> Reply {
    if let Some(caps) = action_regex().and_then(|re| re.captures(reply)) {
        let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let final_at = reply.find(FINAL_ANSWER);
        // A final answer before the action means the model is done.
        if final_at.map_or(true, |f| f > whole) {
            let tool = caps[1].trim().trim_matches('`').to_string();
            let input = strip_quotes(caps[2].trim()).to_string();
            let thought = reply[..whole].trim().to_string();
            return Reply::Act {
                thought,
                tool,
                input,
            };
        }
    }

    match reply.find(FINAL_ANSWER) {
        Some(idx) => Reply::Finish(reply[idx + FINAL_ANSWER.len()..].trim().to_string()),
        None => Reply::Malformed,
    }
}

fn strip_quotes(input: &str) -> &str {
    input
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
}

/// Removes markdown fences and anything after an inline result preview.
fn clean_sql(input: &str) -> String {
    let mut sql = input.trim();
    if let Some(rest) = sql.strip_prefix("```sql") {
        sql = rest;
    } else if let Some(rest) = sql.strip_prefix("```") {
        sql = rest;
    }
    let sql = sql.trim_end().trim_end_matches("```");
    let sql = match sql.find('[') {
        Some(idx) => &sql[..idx],
        None => sql,
    };
    sql.trim().to_string()
}

fn render_observation(observation: &Observation) -> String {
    let text = match observation {
        Observation::Rows(result) => {
            serde_json::to_string(&result.records()).unwrap_or_else(|_| "[]".to_string())
        }
        Observation::Text(text) => text.clone(),
        Observation::Missing => String::new(),
    };
    if text.chars().count() > MAX_OBSERVATION_CHARS {
        let cut: String = text.chars().take(MAX_OBSERVATION_CHARS).collect();
        format!("{cut}... (truncated)")
    } else {
        text
    }
}

impl std::fmt::Debug for SqlAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlAgent")
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}
