//! Task processor: fetch → aggregate → diff → insert → verify for one window.
//!
//! Every failure is folded into the returned `TaskResult`; nothing here
//! aborts the worker that called it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as Days, NaiveDate, Utc};
use clickhouse_client::DayStore;
use coingecko::{MarketChart, MarketDataApi, Metric};
use sync_core::{day_of_millis, days_inclusive, DailyRecord, Error, Horizon, Task, TaskResult};
use telemetry::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How close to the horizon a window end and its newest day must be for
/// the coin to count as currently live.
pub const LIVE_TOLERANCE_DAYS: i64 = 2;

/// Upper bound for the in-task backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay applied before retry attempt `attempt` (0-based): `min(2^a s, 30 s)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

/// Anything that turns a task into exactly one result.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task) -> TaskResult;
}

/// Processor settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub vs_currency: String,
    pub interval: String,
    /// In-task fetch retries; also the scheduler's per-window retry budget
    pub max_retries: u32,
    pub horizon: Horizon,
    pub live_tolerance_days: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            vs_currency: "usd".to_string(),
            interval: "daily".to_string(),
            max_retries: 3,
            horizon: Horizon::System,
            live_tolerance_days: LIVE_TOLERANCE_DAYS,
        }
    }
}

/// Folded values for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayAggregate {
    /// Latest sample timestamp seen for the day across all metrics
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub market_cap: f64,
    pub volume: f64,
}

impl DayAggregate {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            price: 0.0,
            market_cap: 0.0,
            volume: 0.0,
        }
    }
}

/// Fold the three series into one aggregate per UTC day in `[from, to]`.
///
/// Per metric, the last sample of a day wins. Samples outside the window
/// are dropped so the aggregate stays comparable with ranged store lookups.
pub fn aggregate_daily(
    chart: &MarketChart,
    from: NaiveDate,
    to: NaiveDate,
) -> BTreeMap<NaiveDate, DayAggregate> {
    let mut by_day: BTreeMap<NaiveDate, DayAggregate> = BTreeMap::new();

    for metric in [Metric::Price, Metric::MarketCap, Metric::Volume] {
        for (ms, value) in chart.samples(metric) {
            let Some((day, ts)) = day_of_millis(ms) else {
                continue;
            };
            if day < from || day > to {
                continue;
            }

            let agg = by_day.entry(day).or_insert_with(|| DayAggregate::new(ts));
            if ts > agg.timestamp {
                agg.timestamp = ts;
            }
            match metric {
                Metric::Price => agg.price = value,
                Metric::MarketCap => agg.market_cap = value,
                Metric::Volume => agg.volume = value,
            }
        }
    }

    by_day
}

/// Liveness heuristic: the window reaches the horizon and so does its data.
pub fn is_live(window_end: NaiveDate, newest_day: NaiveDate, yesterday: NaiveDate, tolerance: i64) -> bool {
    let threshold = yesterday - Days::days(tolerance);
    window_end >= threshold && newest_day >= threshold
}

/// Executes one window task against the API and the store.
pub struct TaskProcessor {
    api: Arc<dyn MarketDataApi>,
    store: Arc<dyn DayStore>,
    config: ProcessorConfig,
    cancel: CancellationToken,
}

impl TaskProcessor {
    pub fn new(
        api: Arc<dyn MarketDataApi>,
        store: Arc<dyn DayStore>,
        config: ProcessorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            store,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process a task into its result.
    pub async fn process(&self, task: Task) -> TaskResult {
        metrics().tasks_processed.inc();
        let (from, to) = (task.from, task.to);

        // Fast path: first attempts on fully stored windows never hit the API.
        let mut existing: Option<BTreeSet<NaiveDate>> = None;
        if task.retry == 0 {
            match self.store.present_days(&task.coin_id, from, to).await {
                Ok(present) => {
                    let window = days_inclusive(from, to);
                    if !window.is_empty() && window.iter().all(|d| present.contains(d)) {
                        metrics().tasks_skipped.inc();
                        return TaskResult::skipped(task);
                    }
                    existing = Some(present);
                }
                Err(e) => {
                    warn!(id = %task.coin_id, from = %from, to = %to, error = %e, "Pre-check query failed");
                }
            }
        }

        let chart = match self.fetch_with_retry(&task).await {
            Ok(chart) => chart,
            Err(e) => {
                metrics().fetch_errors.inc();
                metrics().tasks_failed.inc();
                warn!(
                    id = %task.coin_id,
                    from = %from,
                    to = %to,
                    status = e.status(),
                    "Fetch failed: {}",
                    e
                );
                return TaskResult::fetch_failed(task, e.status(), e.to_string());
            }
        };

        let by_day = aggregate_daily(&chart, from, to);
        if by_day.is_empty() {
            debug!(id = %task.coin_id, from = %from, to = %to, "Window has no data");
            return TaskResult::no_data(task);
        }
        let api_days = by_day.len();
        metrics().days_fetched.inc_by(api_days as u64);

        let existing = match existing {
            Some(existing) => existing,
            None => match self.store.present_days(&task.coin_id, from, to).await {
                Ok(present) => present,
                Err(e) => {
                    metrics().tasks_failed.inc();
                    return TaskResult::storage_failed(task, api_days, e.to_string());
                }
            },
        };

        let records: Vec<DailyRecord> = by_day
            .iter()
            .filter(|(day, _)| !existing.contains(day))
            .map(|(day, agg)| DailyRecord {
                id: task.coin_id.clone(),
                symbol: task.symbol.clone(),
                vs_currency: self.config.vs_currency.clone(),
                day: *day,
                timestamp: agg.timestamp,
                price: agg.price,
                market_cap: agg.market_cap,
                volume: agg.volume,
            })
            .collect();

        let inserted = match self.insert(&records).await {
            Ok(n) => n,
            Err(e) => {
                metrics().tasks_failed.inc();
                warn!(
                    id = %task.coin_id,
                    from = %from,
                    to = %to,
                    rows = records.len(),
                    "Insert failed: {}",
                    e
                );
                return TaskResult::storage_failed(task, api_days, e.to_string());
            }
        };

        let missing = self.verify(&task, &by_day).await;
        if !missing.is_empty() {
            metrics().reconciliation_gaps.inc();
            warn!(
                id = %task.coin_id,
                symbol = %task.symbol,
                from = %from,
                to = %to,
                missing = missing.len(),
                "Days missing in store after insert"
            );
        }

        // by_day is non-empty here
        let newest = by_day.keys().next_back().copied().unwrap_or(from);
        let active_now = is_live(
            to,
            newest,
            self.config.horizon.yesterday(),
            self.config.live_tolerance_days,
        );

        TaskResult::written(task, inserted, api_days, missing, active_now)
    }

    async fn insert(&self, records: &[DailyRecord]) -> Result<usize, Error> {
        if records.is_empty() {
            return Ok(0);
        }
        self.store.insert_days(records).await
    }

    /// Aggregated days the store does not report after the insert. When the
    /// store cannot be read, every aggregated day counts as unconfirmed.
    async fn verify(&self, task: &Task, by_day: &BTreeMap<NaiveDate, DayAggregate>) -> Vec<NaiveDate> {
        match self.store.present_days(&task.coin_id, task.from, task.to).await {
            Ok(after) => by_day.keys().filter(|d| !after.contains(d)).copied().collect(),
            Err(e) => {
                warn!(id = %task.coin_id, error = %e, "Verify query failed");
                by_day.keys().copied().collect()
            }
        }
    }

    /// Fetch the window, retrying transient failures with capped backoff.
    async fn fetch_with_retry(&self, task: &Task) -> Result<MarketChart, Error> {
        let mut attempt: u32 = 0;
        loop {
            let result = self
                .api
                .fetch_range(
                    &task.coin_id,
                    &self.config.vs_currency,
                    task.from,
                    task.to,
                    &self.config.interval,
                )
                .await;

            let err = match result {
                Ok(chart) => return Ok(chart),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.config.max_retries || self.cancel.is_cancelled() {
                return Err(err);
            }

            let delay = backoff_delay(attempt);
            warn!(
                id = %task.coin_id,
                from = %task.from,
                to = %task.to,
                status = err.status(),
                attempt = attempt,
                backoff_ms = %delay.as_millis(),
                "Transient fetch failure: {}",
                err
            );
            metrics().fetch_retries.inc();

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(err),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[async_trait]
impl TaskHandler for TaskProcessor {
    async fn handle(&self, task: Task) -> TaskResult {
        self.process(task).await
    }
}
