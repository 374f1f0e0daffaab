//! Metrics sinks
//!
//! Agents report through [`MetricsSink`] keyed by role and operation. The
//! caller picks the sink: [`NoopMetrics`] to discard everything,
//! [`FacadeMetrics`] to forward to whatever recorder the process installed,
//! [`InMemoryMetrics`] for tests and the end-of-run summary, or
//! [`MultiMetrics`] to fan out to several of them.

use crate::agent::AgentRole;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Operation names used as metric keys
pub mod ops {
    pub const CREATE_USER: &str = "create_user";
    pub const BATCH_WRITE: &str = "batch_write";
    pub const BATCH_READ: &str = "batch_read";
    pub const BULK_GET: &str = "bulk_get";
    pub const BATCH_UPDATE: &str = "batch_update";
    pub const DOCS_WRITTEN: &str = "docs_written";
    pub const DOCS_READ: &str = "docs_read";
    pub const DOCS_UPDATED: &str = "docs_updated";
    pub const DOCS_FAILED: &str = "docs_failed";
    pub const DOCS_COMPLETED: &str = "docs_completed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub role: AgentRole,
    pub operation: &'static str,
}

impl MetricKey {
    pub fn new(role: AgentRole, operation: &'static str) -> Self {
        Self { role, operation }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.role, self.operation)
    }
}

/// Destination for agent measurements
pub trait MetricsSink: Send + Sync {
    /// Latency of one remote call
    fn record_timing(&self, key: MetricKey, elapsed: Duration);

    fn increment(&self, key: MetricKey, count: u64);

    fn set_gauge(&self, key: MetricKey, value: f64);
}

pub type SharedMetrics = Arc<dyn MetricsSink>;

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_timing(&self, _key: MetricKey, _elapsed: Duration) {}

    fn increment(&self, _key: MetricKey, _count: u64) {}

    fn set_gauge(&self, _key: MetricKey, _value: f64) {}
}

/// Forwards to the `metrics` crate facade.
///
/// Metric names are `{prefix}_{operation}` with a `_seconds` suffix for
/// timings and `_total` for counters; the role is a label.
#[derive(Debug, Clone)]
pub struct FacadeMetrics {
    prefix: String,
}

impl FacadeMetrics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn name(&self, key: &MetricKey, suffix: &str) -> String {
        format!("{}_{}{}", self.prefix, key.operation, suffix)
    }
}

impl MetricsSink for FacadeMetrics {
    fn record_timing(&self, key: MetricKey, elapsed: Duration) {
        metrics::histogram!(self.name(&key, "_seconds"), "role" => key.role.as_str())
            .record(elapsed.as_secs_f64());
    }

    fn increment(&self, key: MetricKey, count: u64) {
        metrics::counter!(self.name(&key, "_total"), "role" => key.role.as_str()).increment(count);
    }

    fn set_gauge(&self, key: MetricKey, value: f64) {
        metrics::gauge!(self.name(&key, ""), "role" => key.role.as_str()).set(value);
    }
}

/// Aggregate of everything recorded under one key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricStats {
    /// Number of timed calls
    pub calls: u64,
    pub total_latency: Duration,
    pub max_latency: Duration,
    /// Sum of counter increments
    pub count: u64,
    /// Last gauge value
    pub gauge: Option<f64>,
}

impl MetricStats {
    pub fn mean_latency(&self) -> Option<Duration> {
        u32::try_from(self.calls)
            .ok()
            .filter(|calls| *calls > 0)
            .map(|calls| self.total_latency / calls)
    }
}

/// Keeps aggregates in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    stats: Mutex<HashMap<MetricKey, MetricStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MetricKey) -> MetricStats {
        self.stats.lock().get(&key).cloned().unwrap_or_default()
    }

    /// All aggregates ordered by role then operation
    pub fn snapshot(&self) -> Vec<(MetricKey, MetricStats)> {
        let mut entries: Vec<_> = self
            .stats
            .lock()
            .iter()
            .map(|(key, stats)| (*key, stats.clone()))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_timing(&self, key: MetricKey, elapsed: Duration) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(key).or_default();
        entry.calls += 1;
        entry.total_latency += elapsed;
        entry.max_latency = entry.max_latency.max(elapsed);
    }

    fn increment(&self, key: MetricKey, count: u64) {
        self.stats.lock().entry(key).or_default().count += count;
    }

    fn set_gauge(&self, key: MetricKey, value: f64) {
        self.stats.lock().entry(key).or_default().gauge = Some(value);
    }
}

/// Sends every measurement to several sinks
#[derive(Clone, Default)]
pub struct MultiMetrics {
    sinks: Vec<SharedMetrics>,
}

impl MultiMetrics {
    pub fn new(sinks: Vec<SharedMetrics>) -> Self {
        Self { sinks }
    }
}

impl MetricsSink for MultiMetrics {
    fn record_timing(&self, key: MetricKey, elapsed: Duration) {
        for sink in &self.sinks {
            sink.record_timing(key, elapsed);
        }
    }

    fn increment(&self, key: MetricKey, count: u64) {
        for sink in &self.sinks {
            sink.increment(key, count);
        }
    }

    fn set_gauge(&self, key: MetricKey, value: f64) {
        for sink in &self.sinks {
            sink.set_gauge(key, value);
        }
    }
}
