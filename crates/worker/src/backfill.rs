//! Backward backfill: per-coin adaptive window search until every coin is done.
//!
//! Each coin walks backward from yesterday in 100-day windows. Before any
//! data is found the coin is searching and narrows its own cursor; once
//! data shows up the next window always ends just before the earliest
//! stored day, and a run of empty windows marks the start of history.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use clickhouse_client::DayStore;
use sync_core::{Coin, Horizon, Result, Task, TaskPhase, TaskResult, WINDOW_DAYS};
use telemetry::{health, metrics};
use tracing::{debug, info, warn};

use crate::pool::WorkerPool;

/// Settled results between two progress lines within a round.
pub const PROGRESS_EVERY: usize = 200;

/// Backfill tuning.
#[derive(Debug, Clone)]
pub struct BackfillSettings {
    /// Earliest day any window may cover
    pub start_date: NaiveDate,
    /// Empty windows after data that end a coin's history
    pub empty_stop_blocks: u32,
    /// Empty windows without data after which a coin is given up
    pub max_search_blocks: u32,
    pub max_retries: u32,
    pub horizon: Horizon,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            empty_stop_blocks: 2,
            max_search_blocks: 30,
            max_retries: 3,
            horizon: Horizon::System,
        }
    }
}

/// Build the window ending at `end`, clamped to `floor`.
///
/// `None` once `end` precedes the floor: there is nothing left to search.
pub fn plan_window(coin_id: &str, symbol: &str, end: NaiveDate, floor: NaiveDate) -> Option<Task> {
    if end < floor {
        return None;
    }
    let from = (end - Duration::days(WINDOW_DAYS - 1)).max(floor);
    Some(Task::new(coin_id, symbol, from, end, TaskPhase::Backfill))
}

/// Where a coin is in its backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinPhase {
    Searching,
    Collecting,
    Done,
}

/// How a settled result changed a coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The coin was already done; nothing changed.
    Ignored,
    FirstData,
    Data,
    EmptyAfterData,
    SearchEmpty,
}

/// Why a coin reached `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Enough empty windows after data: the edge of real history.
    EmptyTail,
    /// No data within the search budget.
    SearchExhausted,
    /// The next window would start before the floor.
    FloorReached,
}

/// Backfill progress for one coin. Lives for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinState {
    pub search_end: NaiveDate,
    pub search_empty: u32,
    pub seen_data: bool,
    pub consecutive_empty: u32,
    done: bool,
}

impl CoinState {
    pub fn new(search_end: NaiveDate) -> Self {
        Self {
            search_end,
            search_empty: 0,
            seen_data: false,
            consecutive_empty: 0,
            done: false,
        }
    }

    pub fn phase(&self) -> CoinPhase {
        if self.done {
            CoinPhase::Done
        } else if self.seen_data {
            CoinPhase::Collecting
        } else {
            CoinPhase::Searching
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) {
        self.done = true;
    }

    /// Apply a terminal result. Done states are never touched again.
    pub fn observe(
        &mut self,
        result: &TaskResult,
        empty_stop_blocks: u32,
        max_search_blocks: u32,
    ) -> (Observation, Option<Completion>) {
        if self.done {
            return (Observation::Ignored, None);
        }

        let observation = if result.has_data() {
            let first = !self.seen_data;
            self.seen_data = true;
            self.search_empty = 0;
            self.consecutive_empty = 0;
            if first {
                Observation::FirstData
            } else {
                Observation::Data
            }
        } else if self.seen_data {
            self.consecutive_empty += 1;
            Observation::EmptyAfterData
        } else {
            self.search_empty += 1;
            self.search_end = result.task.from - Duration::days(1);
            Observation::SearchEmpty
        };

        let completion = if self.seen_data && self.consecutive_empty >= empty_stop_blocks {
            Some(Completion::EmptyTail)
        } else if !self.seen_data && self.search_empty >= max_search_blocks {
            Some(Completion::SearchExhausted)
        } else {
            None
        };
        if completion.is_some() {
            self.finish();
        }

        (observation, completion)
    }
}

/// What a backfill run leaves behind.
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Coins tagged live by any window, keyed by id
    pub active: BTreeMap<String, Coin>,
    /// Final per-coin state
    pub states: BTreeMap<String, CoinState>,
    pub rounds: u32,
}

#[derive(Debug, Default)]
struct RoundTotals {
    settled: usize,
    inserted: usize,
    errors: usize,
    empty: usize,
    retried: usize,
    missing_days: usize,
}

/// Drives backfill rounds over the shared pool.
pub struct BackfillScheduler {
    store: Arc<dyn DayStore>,
    settings: BackfillSettings,
}

impl BackfillScheduler {
    pub fn new(store: Arc<dyn DayStore>, settings: BackfillSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &BackfillSettings {
        &self.settings
    }

    /// Run rounds until every coin is done.
    ///
    /// Returns `Error::Cancelled` if the pool's token fires mid-run; stored
    /// rows are the only progress, so a later run resumes from them.
    pub async fn run(&self, pool: &mut WorkerPool, coins: &[Coin]) -> Result<BackfillReport> {
        let settings = &self.settings;
        let yesterday = settings.horizon.yesterday();

        let mut catalog: BTreeMap<String, Coin> = BTreeMap::new();
        for coin in coins {
            let coin = coin.trimmed();
            if coin.id.is_empty() {
                continue;
            }
            catalog.entry(coin.id.clone()).or_insert(coin);
        }
        let mut states: BTreeMap<String, CoinState> = catalog
            .keys()
            .map(|id| (id.clone(), CoinState::new(yesterday)))
            .collect();
        let mut active: BTreeMap<String, Coin> = BTreeMap::new();

        let total = states.len();
        if total == 0 {
            warn!("Backfill has no coins to process");
            return Ok(BackfillReport::default());
        }

        info!(
            coins = total,
            start_date = %settings.start_date,
            yesterday = %yesterday,
            empty_stop = settings.empty_stop_blocks,
            max_search = settings.max_search_blocks,
            max_retries = settings.max_retries,
            "Backfill started"
        );

        let mut round: u32 = 0;
        loop {
            let pending = self.plan_round(round, yesterday, &catalog, &mut states).await;
            let done = states.values().filter(|s| s.is_done()).count();
            if pending.is_empty() {
                break;
            }

            info!(
                round = round,
                scheduled = pending.len(),
                done = done,
                total = total,
                "Backfill round scheduled"
            );

            let mut totals = RoundTotals::default();
            pool.drive(pending, |result| {
                settle(result, round, settings, &catalog, &mut states, &mut active, &mut totals)
            })
            .await?;

            let done = states.values().filter(|s| s.is_done()).count();
            let collecting = states
                .values()
                .filter(|s| s.phase() == CoinPhase::Collecting)
                .count();
            metrics().coins_done.set(done as u64);
            info!(
                round = round,
                settled = totals.settled,
                inserted = totals.inserted,
                errors = totals.errors,
                empty = totals.empty,
                retried = totals.retried,
                missing_days = totals.missing_days,
                done = done,
                collecting = collecting,
                searching = total - done - collecting,
                active = active.len(),
                "Backfill round finished"
            );
            metrics().snapshot().log("backfill");
            health().log("backfill");

            round += 1;
        }

        info!(coins = total, active = active.len(), rounds = round, "Backfill finished");
        Ok(BackfillReport {
            active,
            states,
            rounds: round,
        })
    }

    /// One window per unfinished coin; coins past the floor become done.
    async fn plan_round(
        &self,
        round: u32,
        yesterday: NaiveDate,
        catalog: &BTreeMap<String, Coin>,
        states: &mut BTreeMap<String, CoinState>,
    ) -> Vec<Task> {
        let mut pending = Vec::new();
        for (id, state) in states.iter_mut() {
            if state.is_done() {
                continue;
            }

            let end = if round == 0 {
                yesterday
            } else {
                match self.store.min_day(id).await {
                    Ok(Some(min)) => min - Duration::days(1),
                    Ok(None) => state.search_end,
                    Err(e) => {
                        warn!(id = %id, round = round, error = %e, "Earliest-day query failed, using search cursor");
                        state.search_end
                    }
                }
            };

            let symbol = catalog
                .get(id)
                .map(Coin::display_symbol)
                .unwrap_or_else(|| id.to_uppercase());
            match plan_window(id, &symbol, end, self.settings.start_date) {
                Some(task) => pending.push(task),
                None => {
                    state.finish();
                    debug!(id = %id, symbol = %symbol, round = round, completion = ?Completion::FloorReached, "Coin reached start date");
                }
            }
        }
        pending
    }
}

fn settle(
    result: TaskResult,
    round: u32,
    settings: &BackfillSettings,
    catalog: &BTreeMap<String, Coin>,
    states: &mut BTreeMap<String, CoinState>,
    active: &mut BTreeMap<String, Coin>,
    totals: &mut RoundTotals,
) -> Option<Task> {
    totals.settled += 1;
    let task = &result.task;

    let state = match states.get_mut(&task.coin_id) {
        Some(state) if !state.is_done() => state,
        _ => return None,
    };

    if result.has_gap() && task.retry < settings.max_retries {
        let retry = task.next_retry();
        totals.retried += 1;
        totals.missing_days += result.missing_dates.len();
        warn!(
            id = %task.coin_id,
            symbol = %task.symbol,
            from = %task.from,
            to = %task.to,
            retry = retry.retry,
            missing = result.missing_dates.len(),
            round = round,
            "Window has missing days, retry scheduled"
        );
        return Some(retry);
    }

    totals.inserted += result.inserted;
    if let Some(err) = &result.error {
        totals.errors += 1;
        warn!(
            id = %task.coin_id,
            symbol = %task.symbol,
            from = %task.from,
            to = %task.to,
            round = round,
            "Task error: {}",
            err
        );
    }
    if result.empty {
        totals.empty += 1;
    }
    if result.active_now {
        let coin = catalog
            .get(&task.coin_id)
            .cloned()
            .unwrap_or_else(|| Coin::new(task.coin_id.clone(), task.symbol.to_lowercase()));
        active.insert(task.coin_id.clone(), coin);
    }

    let (observation, completion) =
        state.observe(&result, settings.empty_stop_blocks, settings.max_search_blocks);
    match observation {
        Observation::FirstData => info!(
            id = %task.coin_id,
            symbol = %task.symbol,
            from = %task.from,
            to = %task.to,
            round = round,
            days = result.api_days,
            "First data seen for coin"
        ),
        Observation::EmptyAfterData => debug!(
            id = %task.coin_id,
            from = %task.from,
            to = %task.to,
            round = round,
            empty_seq = state.consecutive_empty,
            "Empty window after data"
        ),
        Observation::SearchEmpty => debug!(
            id = %task.coin_id,
            from = %task.from,
            to = %task.to,
            round = round,
            search_empty = state.search_empty,
            next_end = %state.search_end,
            "No data yet, searching older"
        ),
        Observation::Data | Observation::Ignored => {}
    }
    match completion {
        Some(Completion::EmptyTail) => {
            info!(id = %task.coin_id, symbol = %task.symbol, round = round, "Coin backfill completed")
        }
        Some(Completion::SearchExhausted) => warn!(
            id = %task.coin_id,
            symbol = %task.symbol,
            round = round,
            "No data within search budget, stopping"
        ),
        Some(Completion::FloorReached) | None => {}
    }

    if totals.settled % PROGRESS_EVERY == 0 {
        info!(
            round = round,
            settled = totals.settled,
            inserted = totals.inserted,
            errors = totals.errors,
            empty = totals.empty,
            retried = totals.retried,
            active = active.len(),
            "Backfill round progress"
        );
    }

    None
}
