use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Aggregated counters for one `"service:operation"` key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationStats {
    pub calls: u64,
    pub errors: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

/// Collects per-operation call counts and latencies.
///
/// Constructed explicitly and injected where needed; nothing is process-global.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    stats: Mutex<BTreeMap<String, OperationStats>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed call of `service:operation`
    pub fn record(&self, service: &str, operation: &str, elapsed: Duration, success: bool) {
        let key = format!("{}:{}", service, operation);
        let elapsed_ms = elapsed.as_millis() as u64;

        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = stats.entry(key).or_default();
        entry.calls += 1;
        if !success {
            entry.errors += 1;
        }
        entry.total_ms += elapsed_ms;
        entry.max_ms = entry.max_ms.max(elapsed_ms);
    }

    /// Starts a timer that records into this collector when finished
    pub fn start<'a>(&'a self, service: &'a str, operation: &'a str) -> OperationTimer<'a> {
        OperationTimer {
            collector: self,
            service,
            operation,
            started: Instant::now(),
        }
    }

    /// Current counters without resetting them
    pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the current counters and starts a fresh window
    pub fn flush(&self) -> BTreeMap<String, OperationStats> {
        std::mem::take(&mut *self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    pub fn reset(&self) {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

/// Timer returned by [`MetricsCollector::start`]
pub struct OperationTimer<'a> {
    collector: &'a MetricsCollector,
    service: &'a str,
    operation: &'a str,
    started: Instant,
}

impl OperationTimer<'_> {
    pub fn finish(self, success: bool) {
        self.collector
            .record(self.service, self.operation, self.started.elapsed(), success);
    }
}
