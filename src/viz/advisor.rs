//! Optional LLM chart suggestion.
//!
//! Advisory only: the classifier decides the chart. A failed or unreadable
//! suggestion is logged and dropped.

use std::sync::Arc;
use tracing::{debug, warn};

use super::ChartKind;
use crate::llm::{LlmClient, Message};

pub struct ChartAdvisor {
    llm: Arc<dyn LlmClient>,
}

impl ChartAdvisor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Asks for a chart type for `answer`. `None` when the call fails or the
    /// reply names no known chart.
    pub async fn suggest(&self, answer: &str) -> Option<ChartKind> {
        let prompt = format!(
            "Based on the following data, suggest the best chart type (bar, line, area, pie, donut, card):\n\
{answer}\n\n\
Return only the chart type name in lowercase."
        );

        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(reply) => {
                let kind = ChartKind::from_suggestion(&reply);
                debug!(reply = reply.trim(), ?kind, "chart suggestion");
                kind
            }
            Err(e) => {
                warn!("chart suggestion failed: {}", e);
                None
            }
        }
    }
}
