//! Scripted prober for tests.

use super::{ProbeReport, Prober};
use crate::error::{DataVizError, ProbeFailure, Result};
use crate::registry::ConnectionRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A prober that succeeds unless a failure was scripted for the host.
#[derive(Default)]
pub struct MockProber {
    failures: Mutex<HashMap<String, (ProbeFailure, String)>>,
    calls: AtomicUsize,
}

impl MockProber {
    /// Creates a prober that accepts every connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes probes against `host` fail with the given classification.
    pub fn fail_host(&self, host: &str, failure: ProbeFailure, message: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(host.to_string(), (failure, message.to_string()));
        }
    }

    /// Makes probes against `host` succeed again.
    pub fn heal_host(&self, host: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(host);
        }
    }

    /// Number of probes performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, record: &ConnectionRecord) -> Result<ProbeReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .failures
            .lock()
            .map_err(|_| DataVizError::internal("mock prober lock poisoned"))?
            .get(&record.host)
            .cloned();

        match scripted {
            Some((failure, message)) => Err(DataVizError::probe(failure, message)),
            None => Ok(ProbeReport {
                backend: record.kind,
                server_version: Some(format!("mock {}", record.kind)),
                elapsed: Duration::from_millis(1),
            }),
        }
    }
}
