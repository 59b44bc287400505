//! Mock LLM client for testing.
//!
//! Replies are matched against the last user message by substring first; if
//! none match, queued replies are handed out in order.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DataVizError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    patterns: Vec<(String, String)>,
    queue: Arc<Mutex<VecDeque<String>>>,
    fallback: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies with `response` whenever the last user message contains `pattern`.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.patterns.push((pattern.into().to_lowercase(), response.into()));
        self
    }

    /// Queues a reply for the next unmatched call.
    pub fn with_reply(self, response: impl Into<String>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(response.into());
        }
        self
    }

    /// Reply used once patterns and queue are exhausted.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = Self::last_user_input(messages);

        if let Some((_, response)) = self.patterns.iter().find(|(p, _)| input.contains(p)) {
            return Ok(response.clone());
        }

        let queued = self
            .queue
            .lock()
            .map_err(|_| DataVizError::internal("mock llm lock poisoned"))?
            .pop_front();

        queued
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| DataVizError::reasoning("mock llm has no scripted reply"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_match_wins() {
        let client = MockLlmClient::new()
            .with_response("chart", "bar")
            .with_reply("queued");
        let reply = client.complete(&[Message::user("Which CHART fits?")]).await.unwrap();
        assert_eq!(reply, "bar");
    }

    #[tokio::test]
    async fn test_queue_then_fallback_then_error() {
        let client = MockLlmClient::new().with_reply("one").with_fallback("later");
        let msgs = [Message::user("x")];
        assert_eq!(client.complete(&msgs).await.unwrap(), "one");
        assert_eq!(client.complete(&msgs).await.unwrap(), "later");
        assert_eq!(client.calls(), 2);

        let empty = MockLlmClient::new();
        assert!(empty.complete(&msgs).await.is_err());
    }
}
