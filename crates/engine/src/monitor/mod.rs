//! Performance monitor: brackets traced operations and keeps a bounded
//! history of completed metrics, plus per-backend call outcomes used for
//! routing advice.

mod routing;

pub use routing::{Backend, BackendStats, RoutingAdvice};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Completed metrics retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// `stats()` looks at this many most recent metrics
pub const STATS_WINDOW: usize = 20;

/// Operations slower than this are logged at warn level
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(2);

struct ActiveOperation {
    label: String,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    metadata: Value,
}

/// A finished operation; never mutated after it enters the history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub id: String,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub sample_size: usize,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub active_operations: usize,
    pub history_len: usize,
}

pub struct PerformanceMonitor {
    active: Mutex<HashMap<String, ActiveOperation>>,
    history: Mutex<VecDeque<PerformanceMetric>>,
    capacity: usize,
    slow_threshold: Duration,
    backends: Mutex<HashMap<Backend, VecDeque<routing::CallOutcome>>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shallow-merge `extra` into `base` when both are objects
fn merge_metadata(base: &mut Value, extra: Value) {
    match (base, extra) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(extra)) => base.extend(extra),
        (base, extra) => *base = extra,
    }
}

impl PerformanceMonitor {
    pub fn new(capacity: usize, slow_threshold: Duration) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            slow_threshold,
            backends: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// A process-unique id for `label`, for callers running concurrently
    pub fn operation_id(&self, label: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", label, n)
    }

    /// Begin timing an operation. Reusing an active id replaces it.
    pub fn start(&self, id: &str, label: &str, metadata: Value) {
        let previous = lock(&self.active).insert(
            id.to_string(),
            ActiveOperation {
                label: label.to_string(),
                started_at: Instant::now(),
                started_wall: Utc::now(),
                metadata,
            },
        );
        if previous.is_some() {
            warn!("Operation {} restarted before it ended", id);
        }
    }

    /// Finish an operation and return its duration. Unknown ids are ignored.
    pub fn end(&self, id: &str, metadata: Value) -> Option<Duration> {
        self.finish(id, true, metadata)
    }

    fn finish(&self, id: &str, success: bool, metadata: Value) -> Option<Duration> {
        let Some(mut op) = lock(&self.active).remove(id) else {
            warn!("end() called for unknown operation {}", id);
            return None;
        };

        let duration = op.started_at.elapsed();
        merge_metadata(&mut op.metadata, metadata);

        if duration >= self.slow_threshold {
            warn!("Slow operation {} ({}): {}ms", op.label, id, duration.as_millis());
        } else {
            debug!("{} finished in {}ms", op.label, duration.as_millis());
        }

        let metric = PerformanceMetric {
            id: id.to_string(),
            operation: op.label,
            start_time: op.started_wall,
            end_time: Utc::now(),
            duration_ms: duration.as_micros() as f64 / 1000.0,
            success,
            metadata: op.metadata,
        };

        let mut history = lock(&self.history);
        if history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(metric);

        Some(duration)
    }

    /// Time `fut`. The metric is recorded even if the future is dropped
    /// early or panics; those runs are marked unsuccessful.
    pub async fn measure<F, T>(&self, id: &str, label: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.start(id, label, Value::Null);
        let mut guard = MeasureGuard {
            monitor: self,
            id,
            armed: true,
        };
        let output = fut.await;
        guard.armed = false;
        self.finish(id, true, Value::Null);
        output
    }

    /// Like [`measure`](Self::measure) but records `Err` outputs as failures
    pub async fn measure_result<F, T, E>(&self, id: &str, label: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.start(id, label, Value::Null);
        let mut guard = MeasureGuard {
            monitor: self,
            id,
            armed: true,
        };
        let output = fut.await;
        guard.armed = false;
        match &output {
            Ok(_) => self.finish(id, true, Value::Null),
            Err(e) => self.finish(id, false, serde_json::json!({ "error": e.to_string() })),
        };
        output
    }

    /// Aggregate over the most recent [`STATS_WINDOW`] metrics
    pub fn stats(&self) -> PerformanceStats {
        let history = lock(&self.history);
        let active_operations = lock(&self.active).len();

        let window: Vec<f64> = history
            .iter()
            .rev()
            .take(STATS_WINDOW)
            .map(|m| m.duration_ms)
            .collect();

        if window.is_empty() {
            return PerformanceStats {
                active_operations,
                ..Default::default()
            };
        }

        let sum: f64 = window.iter().sum();
        PerformanceStats {
            sample_size: window.len(),
            average_ms: sum / window.len() as f64,
            min_ms: window.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: window.iter().copied().fold(0.0, f64::max),
            active_operations,
            history_len: history.len(),
        }
    }

    /// Most recent first
    pub fn recent(&self, limit: usize) -> Vec<PerformanceMetric> {
        lock(&self.history).iter().rev().take(limit).cloned().collect()
    }

    pub fn slow_operations(&self, threshold: Duration) -> Vec<PerformanceMetric> {
        let threshold_ms = threshold.as_micros() as f64 / 1000.0;
        lock(&self.history)
            .iter()
            .filter(|m| m.duration_ms >= threshold_ms)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.history).clear();
        lock(&self.backends).clear();
    }

    /// Record the outcome of a call to `backend`
    pub fn record_api_call(&self, backend: Backend, success: bool, latency: Duration) {
        let mut backends = lock(&self.backends);
        let calls = backends.entry(backend).or_default();
        if calls.len() >= routing::CALL_WINDOW {
            calls.pop_front();
        }
        calls.push_back(routing::CallOutcome { success, latency });
    }

    pub fn backend_stats(&self, backend: Backend) -> BackendStats {
        let backends = lock(&self.backends);
        BackendStats::from_calls(backends.get(&backend).map(|c| c.iter()).into_iter().flatten())
    }

    /// Advisory only: nothing in the service switches backends on its own
    pub fn routing_advice(&self) -> RoutingAdvice {
        RoutingAdvice::recommend(
            self.backend_stats(Backend::Internal),
            self.backend_stats(Backend::External),
        )
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_SLOW_THRESHOLD)
    }
}

struct MeasureGuard<'a> {
    monitor: &'a PerformanceMonitor,
    id: &'a str,
    armed: bool,
}

impl Drop for MeasureGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.monitor
                .finish(self.id, false, serde_json::json!({ "aborted": true }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_start_end_records_duration() {
        let monitor = PerformanceMonitor::default();
        monitor.start("op-1", "balances", json!({ "wallets": 3 }));
        advance(Duration::from_millis(250)).await;

        let duration = monitor.end("op-1", json!({ "fetched": 2 })).unwrap();
        assert_eq!(duration, Duration::from_millis(250));

        let recent = monitor.recent(1);
        assert_eq!(recent[0].operation, "balances");
        assert_eq!(recent[0].metadata["wallets"], 3);
        assert_eq!(recent[0].metadata["fetched"], 2);
        assert!(recent[0].success);
    }

    #[tokio::test]
    async fn test_unknown_end_is_noop() {
        let monitor = PerformanceMonitor::default();
        assert!(monitor.end("missing", Value::Null).is_none());
        assert_eq!(monitor.stats().history_len, 0);
    }

    #[tokio::test]
    async fn test_measure_result_records_failure() {
        let monitor = PerformanceMonitor::default();
        let out: Result<(), String> = monitor
            .measure_result("op", "sign", async { Err("boom".to_string()) })
            .await;
        assert!(out.is_err());

        let metric = &monitor.recent(1)[0];
        assert!(!metric.success);
        assert_eq!(metric.metadata["error"], "boom");
        assert_eq!(monitor.stats().active_operations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_cancelled_future_does_not_leak() {
        let monitor = PerformanceMonitor::default();
        let slow = monitor.measure("op", "image", tokio::time::sleep(Duration::from_secs(60)));
        let timed_out = tokio::time::timeout(Duration::from_secs(1), slow).await;
        assert!(timed_out.is_err());

        assert_eq!(monitor.stats().active_operations, 0);
        let metric = &monitor.recent(1)[0];
        assert!(!metric.success);
        assert_eq!(metric.metadata["aborted"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded_and_stats_use_recent_window() {
        let monitor = PerformanceMonitor::new(30, DEFAULT_SLOW_THRESHOLD);
        for i in 0..40u64 {
            let id = monitor.operation_id("op");
            monitor.start(&id, "op", Value::Null);
            advance(Duration::from_millis(i + 1)).await;
            monitor.end(&id, Value::Null);
        }

        let stats = monitor.stats();
        assert_eq!(stats.history_len, 30);
        assert_eq!(stats.sample_size, STATS_WINDOW);
        // Last 20 runs took 21..=40ms
        assert_eq!(stats.min_ms, 21.0);
        assert_eq!(stats.max_ms, 40.0);
        assert_eq!(stats.average_ms, 30.5);
        assert_eq!(monitor.slow_operations(Duration::from_millis(38)).len(), 3);
    }

    #[tokio::test]
    async fn test_routing_advice_from_recorded_calls() {
        let monitor = PerformanceMonitor::default();
        for _ in 0..10 {
            monitor.record_api_call(Backend::Internal, false, Duration::from_millis(50));
            monitor.record_api_call(Backend::External, true, Duration::from_millis(300));
        }

        assert_eq!(monitor.backend_stats(Backend::Internal).success_rate, 0.0);
        let advice = monitor.routing_advice();
        assert_eq!(advice.preferred, Backend::External);
        assert_eq!(advice.external.calls, 10);

        monitor.clear();
        assert_eq!(monitor.routing_advice().preferred, Backend::Internal);
    }
}
