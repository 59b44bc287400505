//! Mock reasoning engine for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ExecutionTrace, ReasoningEngine, ReasoningRequest};
use crate::error::{DataVizError, Result};

/// Engine that returns canned traces.
///
/// A trace registered for a question substring wins; otherwise the default
/// trace is returned. Clones share the call counter.
#[derive(Clone, Default)]
pub struct MockReasoningEngine {
    traces: Vec<(String, ExecutionTrace)>,
    default_trace: ExecutionTrace,
    failure: Option<Arc<Mutex<Option<DataVizError>>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<ReasoningRequest>>>,
}

impl MockReasoningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace returned when no question pattern matches.
    pub fn with_default(mut self, trace: ExecutionTrace) -> Self {
        self.default_trace = trace;
        self
    }

    /// Returns `trace` for questions containing `pattern` (case-insensitive).
    pub fn with_trace(mut self, pattern: &str, trace: ExecutionTrace) -> Self {
        self.traces.push((pattern.to_lowercase(), trace));
        self
    }

    /// Fails the next call with `err`, then fails with a generic message.
    pub fn failing(mut self, err: DataVizError) -> Self {
        self.failure = Some(Arc::new(Mutex::new(Some(err))));
        self
    }

    /// Sleeps before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request seen.
    pub fn last_request(&self) -> Option<ReasoningRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl ReasoningEngine for MockReasoningEngine {
    async fn run(&self, request: &ReasoningRequest) -> Result<ExecutionTrace> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = &self.failure {
            let err = failure
                .lock()
                .map_err(|_| DataVizError::internal("mock engine lock poisoned"))?
                .take();
            return Err(err.unwrap_or_else(|| DataVizError::reasoning("mock engine failure")));
        }

        let question = request.question.to_lowercase();
        let trace = self
            .traces
            .iter()
            .find(|(pattern, _)| question.contains(pattern))
            .map(|(_, trace)| trace.clone())
            .unwrap_or_else(|| self.default_trace.clone());
        Ok(trace)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
