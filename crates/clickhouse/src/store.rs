//! The storage seam consumed by the task processor and schedulers.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use sync_core::{DailyRecord, Result};

use crate::client::ClickHouseClient;
use crate::{health, insert, query};

/// Day-granular record store.
///
/// Writes may not be visible to the next read, which is why callers verify
/// every insert with a fresh `present_days`.
#[async_trait]
pub trait DayStore: Send + Sync {
    /// Days stored for a coin within `[from, to]`.
    async fn present_days(
        &self,
        coin_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>>;

    /// Earliest stored day, `None` when the coin has no rows.
    async fn min_day(&self, coin_id: &str) -> Result<Option<NaiveDate>>;

    /// Latest stored day, `None` when the coin has no rows.
    async fn max_day(&self, coin_id: &str) -> Result<Option<NaiveDate>>;

    /// Write all records or none; returns the number written.
    async fn insert_days(&self, records: &[DailyRecord]) -> Result<usize>;

    /// Idempotently create the table.
    async fn ensure_schema(&self, table: &str) -> Result<()>;
}

#[async_trait]
impl DayStore for ClickHouseClient {
    async fn present_days(
        &self,
        coin_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        query::present_days(self, coin_id, from, to).await
    }

    async fn min_day(&self, coin_id: &str) -> Result<Option<NaiveDate>> {
        query::min_day(self, coin_id).await
    }

    async fn max_day(&self, coin_id: &str) -> Result<Option<NaiveDate>> {
        query::max_day(self, coin_id).await
    }

    async fn insert_days(&self, records: &[DailyRecord]) -> Result<usize> {
        insert::insert_daily_records(self, records).await
    }

    async fn ensure_schema(&self, table: &str) -> Result<()> {
        health::init_schema(self, table).await
    }
}
