//! In-memory stand-ins for the store and the market data API.
//!
//! Both implement the same traits as the ClickHouse and CoinGecko clients,
//! so the real processor, pool, and schedulers run against them unchanged.

use async_trait::async_trait;
use chrono::NaiveDate;
use clickhouse_client::DayStore;
use coingecko::{CoinStatus, MarketChart, MarketDataApi};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use sync_core::{Coin, DailyRecord, Error, Result};

use crate::fixtures;

/// Store keeping rows per coin and day.
///
/// `drop_inserts(n)` makes the next `n` insert calls report success without
/// storing anything, which is how a lagging store looks to the verify step.
#[derive(Default)]
pub struct MockStore {
    rows: Mutex<BTreeMap<String, BTreeMap<NaiveDate, DailyRecord>>>,
    dropped_inserts: AtomicUsize,
    fail_inserts: AtomicBool,
    fail_queries: AtomicBool,
    insert_calls: AtomicUsize,
    present_calls: AtomicUsize,
    max_day_calls: AtomicUsize,
    schemas: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `[from, to]` for a coin.
    pub fn seed(&self, coin_id: &str, from: NaiveDate, to: NaiveDate) {
        let mut rows = self.rows.lock();
        let coin = rows.entry(coin_id.to_string()).or_default();
        for day in sync_core::days_inclusive(from, to) {
            coin.insert(day, fixtures::record(coin_id, day));
        }
    }

    pub fn drop_inserts(&self, n: usize) {
        self.dropped_inserts.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Stored days for a coin, ascending.
    pub fn days(&self, coin_id: &str) -> Vec<NaiveDate> {
        self.rows
            .lock()
            .get(coin_id)
            .map(|days| days.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn record(&self, coin_id: &str, day: NaiveDate) -> Option<DailyRecord> {
        self.rows.lock().get(coin_id).and_then(|days| days.get(&day).cloned())
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().values().map(BTreeMap::len).sum()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn present_calls(&self) -> usize {
        self.present_calls.load(Ordering::SeqCst)
    }

    /// Newest-day lookups; only incremental passes issue them.
    pub fn max_day_calls(&self) -> usize {
        self.max_day_calls.load(Ordering::SeqCst)
    }

    pub fn schemas(&self) -> Vec<String> {
        self.schemas.lock().clone()
    }

    fn check_queries(&self) -> Result<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::database("mock query failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl DayStore for MockStore {
    async fn present_days(
        &self,
        coin_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        self.present_calls.fetch_add(1, Ordering::SeqCst);
        self.check_queries()?;
        Ok(self
            .rows
            .lock()
            .get(coin_id)
            .map(|days| days.range(from..=to).map(|(d, _)| *d).collect())
            .unwrap_or_default())
    }

    async fn min_day(&self, coin_id: &str) -> Result<Option<NaiveDate>> {
        self.check_queries()?;
        Ok(self
            .rows
            .lock()
            .get(coin_id)
            .and_then(|days| days.keys().next().copied()))
    }

    async fn max_day(&self, coin_id: &str) -> Result<Option<NaiveDate>> {
        self.max_day_calls.fetch_add(1, Ordering::SeqCst);
        self.check_queries()?;
        Ok(self
            .rows
            .lock()
            .get(coin_id)
            .and_then(|days| days.keys().next_back().copied()))
    }

    async fn insert_days(&self, records: &[DailyRecord]) -> Result<usize> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if records.is_empty() {
            return Ok(0);
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::database("mock insert failure"));
        }

        let dropped = self
            .dropped_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !dropped {
            let mut rows = self.rows.lock();
            for record in records {
                rows.entry(record.id.clone())
                    .or_default()
                    .insert(record.day, record.clone());
            }
        }
        Ok(records.len())
    }

    async fn ensure_schema(&self, table: &str) -> Result<()> {
        self.schemas.lock().push(table.to_string());
        Ok(())
    }
}

/// One recorded range fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub coin_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// API serving one sample per day inside each coin's configured history.
#[derive(Default)]
pub struct MockApi {
    history: Mutex<HashMap<String, (NaiveDate, NaiveDate)>>,
    /// Scripted failure statuses per coin, consumed one per call; 0 is a
    /// network error
    failures: Mutex<HashMap<String, VecDeque<u16>>>,
    always_fail: Mutex<HashMap<String, u16>>,
    active: Mutex<Vec<Coin>>,
    inactive: Mutex<Vec<Coin>>,
    fail_lists: AtomicBool,
    calls: Mutex<Vec<FetchCall>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coin has data on every day of `[from, to]`.
    pub fn with_history(&self, coin_id: &str, from: NaiveDate, to: NaiveDate) {
        self.history.lock().insert(coin_id.to_string(), (from, to));
    }

    /// Next `times` fetches for a coin fail with `status`.
    pub fn fail_next(&self, coin_id: &str, status: u16, times: usize) {
        let mut failures = self.failures.lock();
        let queue = failures.entry(coin_id.to_string()).or_default();
        queue.extend(std::iter::repeat(status).take(times));
    }

    pub fn fail_always(&self, coin_id: &str, status: u16) {
        self.always_fail.lock().insert(coin_id.to_string(), status);
    }

    pub fn set_lists(&self, active: Vec<Coin>, inactive: Vec<Coin>) {
        *self.active.lock() = active;
        *self.inactive.lock() = inactive;
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Ids in fetch order.
    pub fn fetch_order(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.coin_id.clone()).collect()
    }

    pub fn calls_for(&self, coin_id: &str) -> Vec<FetchCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.coin_id == coin_id)
            .cloned()
            .collect()
    }

    fn scripted_failure(&self, coin_id: &str) -> Option<Error> {
        let status = self
            .failures
            .lock()
            .get_mut(coin_id)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.always_fail.lock().get(coin_id).copied())?;
        Some(match status {
            0 => Error::network("mock connection reset"),
            status => Error::http(status, "{\"error\":\"mock\"}"),
        })
    }
}

#[async_trait]
impl MarketDataApi for MockApi {
    async fn list_coins(&self, status: CoinStatus) -> Result<Vec<Coin>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Error::http(500, "mock list failure"));
        }
        Ok(match status {
            CoinStatus::Active => self.active.lock().clone(),
            CoinStatus::Inactive => self.inactive.lock().clone(),
        })
    }

    async fn fetch_range(
        &self,
        coin_id: &str,
        _vs_currency: &str,
        from: NaiveDate,
        to: NaiveDate,
        _interval: &str,
    ) -> Result<MarketChart> {
        self.calls.lock().push(FetchCall {
            coin_id: coin_id.to_string(),
            from,
            to,
        });

        if let Some(err) = self.scripted_failure(coin_id) {
            return Err(err);
        }

        let Some((first, last)) = self.history.lock().get(coin_id).copied() else {
            return Ok(MarketChart::default());
        };
        let days = sync_core::days_inclusive(from.max(first), to.min(last));
        Ok(fixtures::chart_for_days(&days))
    }
}
