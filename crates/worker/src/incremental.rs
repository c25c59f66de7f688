//! Incremental pass: fill each live coin forward from its newest stored day.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use clickhouse_client::DayStore;
use sync_core::{Coin, CoinFilter, Horizon, Result, Task, TaskPhase, WINDOW_DAYS};
use telemetry::{health, metrics};
use tracing::{debug, info, warn};

use crate::pool::WorkerPool;

/// Consecutive windows from the day after each coin's newest day through
/// `yesterday`. Coins without stored rows, or already current, get none.
/// Repeated ids are planned once.
pub fn build_incremental_tasks(
    coins: &[Coin],
    max_days: &BTreeMap<String, NaiveDate>,
    yesterday: NaiveDate,
    filter: &CoinFilter,
) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut seen = HashSet::new();
    for coin in coins {
        let id = coin.id.trim();
        if id.is_empty() || !filter.allows(id) || !seen.insert(id) {
            continue;
        }
        let Some(max_day) = max_days.get(id) else {
            continue;
        };

        let symbol = coin.display_symbol();
        let mut cursor = *max_day + Duration::days(1);
        while cursor <= yesterday {
            let end = (cursor + Duration::days(WINDOW_DAYS - 1)).min(yesterday);
            tasks.push(Task::new(id, symbol.clone(), cursor, end, TaskPhase::Incremental));
            cursor = end + Duration::days(1);
        }
    }
    tasks
}

/// Summary of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub coins: usize,
    pub tasks: usize,
    pub inserted: usize,
    pub errors: usize,
    pub retried: usize,
    /// Windows that still had missing days after the last allowed retry
    pub gaps_left: usize,
}

/// Runs one gap-filling pass per call.
pub struct IncrementalScheduler {
    store: Arc<dyn DayStore>,
    filter: CoinFilter,
    max_retries: u32,
    horizon: Horizon,
}

impl IncrementalScheduler {
    pub fn new(store: Arc<dyn DayStore>, filter: CoinFilter, max_retries: u32, horizon: Horizon) -> Self {
        Self {
            store,
            filter,
            max_retries,
            horizon,
        }
    }

    /// One pass over `coins`.
    ///
    /// Failed tasks are logged and dropped; the next pass recomputes every
    /// start from the store and picks them up again.
    pub async fn run_once(&self, pool: &mut WorkerPool, coins: &[Coin]) -> Result<PassSummary> {
        let yesterday = self.horizon.yesterday();

        let mut max_days: BTreeMap<String, NaiveDate> = BTreeMap::new();
        for coin in coins {
            let id = coin.id.trim();
            if id.is_empty() || !self.filter.allows(id) || max_days.contains_key(id) {
                continue;
            }
            match self.store.max_day(id).await {
                Ok(Some(day)) => {
                    max_days.insert(id.to_string(), day);
                }
                Ok(None) => debug!(id = %id, "No stored rows, skipping"),
                Err(e) => warn!(id = %id, error = %e, "Newest-day query failed, skipping"),
            }
        }

        let tasks = build_incremental_tasks(coins, &max_days, yesterday, &self.filter);
        let mut summary = PassSummary {
            coins: max_days.len(),
            tasks: tasks.len(),
            ..Default::default()
        };
        if tasks.is_empty() {
            info!(coins = summary.coins, yesterday = %yesterday, "Incremental pass has nothing to fetch");
            return Ok(summary);
        }

        info!(coins = summary.coins, tasks = summary.tasks, yesterday = %yesterday, "Incremental pass started");

        let max_retries = self.max_retries;
        pool.drive(tasks, |result| {
            let task = &result.task;
            if result.has_gap() {
                if task.retry < max_retries {
                    summary.retried += 1;
                    warn!(
                        id = %task.coin_id,
                        symbol = %task.symbol,
                        from = %task.from,
                        to = %task.to,
                        retry = task.retry + 1,
                        missing = result.missing_dates.len(),
                        "Window has missing days, retry scheduled"
                    );
                    return Some(task.next_retry());
                }
                summary.gaps_left += 1;
            }

            summary.inserted += result.inserted;
            if let Some(err) = &result.error {
                summary.errors += 1;
                warn!(
                    id = %task.coin_id,
                    symbol = %task.symbol,
                    from = %task.from,
                    to = %task.to,
                    "Incremental task failed: {}",
                    err
                );
            }
            None
        })
        .await?;

        info!(
            coins = summary.coins,
            tasks = summary.tasks,
            inserted = summary.inserted,
            errors = summary.errors,
            retried = summary.retried,
            gaps_left = summary.gaps_left,
            "Incremental pass finished"
        );
        metrics().snapshot().log("incremental");
        health().log("incremental");
        Ok(summary)
    }
}
