//! Internal metrics collection.
//!
//! Counters are process-global and cumulative; snapshots are logged by the
//! schedulers after every round and pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturate at zero
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
    buckets: [AtomicU64; 10],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 10] = [10, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// Returns (upper bound ms, count) pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the sync engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Task processing
    pub tasks_processed: Counter,
    pub tasks_skipped: Counter,
    pub tasks_failed: Counter,

    // Remote API
    pub fetch_requests: Counter,
    pub fetch_retries: Counter,
    pub fetch_errors: Counter,
    pub days_fetched: Counter,

    // ClickHouse
    pub days_inserted: Counter,
    pub insert_errors: Counter,

    // Reconciliation
    pub reconciliation_gaps: Counter,
    pub retries_requeued: Counter,

    // Latency histograms
    pub fetch_latency_ms: Histogram,
    pub insert_latency_ms: Histogram,

    // Gauges
    pub tasks_in_flight: Gauge,
    pub coins_done: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            tasks_processed: self.tasks_processed.get(),
            tasks_skipped: self.tasks_skipped.get(),
            tasks_failed: self.tasks_failed.get(),
            fetch_requests: self.fetch_requests.get(),
            fetch_retries: self.fetch_retries.get(),
            fetch_errors: self.fetch_errors.get(),
            days_fetched: self.days_fetched.get(),
            days_inserted: self.days_inserted.get(),
            insert_errors: self.insert_errors.get(),
            reconciliation_gaps: self.reconciliation_gaps.get(),
            retries_requeued: self.retries_requeued.get(),
            fetch_latency_mean_ms: self.fetch_latency_ms.mean(),
            insert_latency_mean_ms: self.insert_latency_ms.mean(),
            tasks_in_flight: self.tasks_in_flight.get(),
            coins_done: self.coins_done.get(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub tasks_processed: u64,
    pub tasks_skipped: u64,
    pub tasks_failed: u64,
    pub fetch_requests: u64,
    pub fetch_retries: u64,
    pub fetch_errors: u64,
    pub days_fetched: u64,
    pub days_inserted: u64,
    pub insert_errors: u64,
    pub reconciliation_gaps: u64,
    pub retries_requeued: u64,
    pub fetch_latency_mean_ms: f64,
    pub insert_latency_mean_ms: f64,
    pub tasks_in_flight: u64,
    pub coins_done: u64,
}

impl MetricsSnapshot {
    /// Emit the snapshot as one structured log line.
    pub fn log(&self, scope: &str) {
        tracing::info!(
            scope = scope,
            tasks = self.tasks_processed,
            skipped = self.tasks_skipped,
            failed = self.tasks_failed,
            requests = self.fetch_requests,
            fetch_retries = self.fetch_retries,
            fetch_errors = self.fetch_errors,
            days_fetched = self.days_fetched,
            days_inserted = self.days_inserted,
            insert_errors = self.insert_errors,
            gaps = self.reconciliation_gaps,
            requeued = self.retries_requeued,
            fetch_mean_ms = self.fetch_latency_mean_ms,
            insert_mean_ms = self.insert_latency_mean_ms,
            "Metrics snapshot"
        );
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
