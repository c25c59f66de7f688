//! Day lookups used for dedup, verification, and window planning.

use crate::client::ClickHouseClient;
use chrono::NaiveDate;
use clickhouse::Row;
use serde::Deserialize;
use std::collections::BTreeSet;
use sync_core::{parse_date, Error, Result, DATE_FORMAT};

/// Extreme day of an entity plus the row count behind it. ClickHouse
/// returns a default date for aggregates over no rows, so `rows` decides.
#[derive(Debug, Clone, Row, Deserialize)]
struct DayBound {
    day: String,
    rows: u64,
}

impl DayBound {
    fn into_day(self) -> Result<Option<NaiveDate>> {
        if self.rows == 0 {
            return Ok(None);
        }
        parse_stored_day(&self.day).map(Some)
    }
}

fn parse_stored_day(s: &str) -> Result<NaiveDate> {
    parse_date(s).map_err(|e| Error::database(format!("unexpected day {:?}: {}", s, e)))
}

/// Distinct days stored for a coin within `[from, to]`.
pub async fn present_days(
    client: &ClickHouseClient,
    coin_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<BTreeSet<NaiveDate>> {
    let sql = format!(
        "SELECT toString(_date) AS d FROM {} \
         WHERE id = ? AND _date BETWEEN toDate(?) AND toDate(?) \
         GROUP BY d",
        client.table()
    );

    let _slot = client.slot().await?;
    let rows: Vec<String> = client
        .inner()
        .query(&sql)
        .bind(coin_id)
        .bind(from.format(DATE_FORMAT).to_string())
        .bind(to.format(DATE_FORMAT).to_string())
        .fetch_all()
        .await
        .map_err(|e| Error::database(format!("present days query: {}", e)))?;

    rows.iter().map(|d| parse_stored_day(d)).collect()
}

async fn day_bound(client: &ClickHouseClient, coin_id: &str, agg: &str) -> Result<Option<NaiveDate>> {
    let sql = format!(
        "SELECT toString({}(_date)) AS day, count() AS rows FROM {} WHERE id = ?",
        agg,
        client.table()
    );

    let _slot = client.slot().await?;
    let bound: DayBound = client
        .inner()
        .query(&sql)
        .bind(coin_id)
        .fetch_one()
        .await
        .map_err(|e| Error::database(format!("{} day query: {}", agg, e)))?;

    bound.into_day()
}

/// Earliest stored day for a coin.
pub async fn min_day(client: &ClickHouseClient, coin_id: &str) -> Result<Option<NaiveDate>> {
    day_bound(client, coin_id, "min").await
}

/// Latest stored day for a coin.
pub async fn max_day(client: &ClickHouseClient, coin_id: &str) -> Result<Option<NaiveDate>> {
    day_bound(client, coin_id, "max").await
}

/// Total rows for a coin (used in tests and admin).
pub async fn count_rows(client: &ClickHouseClient, coin_id: &str) -> Result<u64> {
    let sql = format!("SELECT count() FROM {} WHERE id = ?", client.table());
    client
        .inner()
        .query(&sql)
        .bind(coin_id)
        .fetch_one()
        .await
        .map_err(|e| Error::database(format!("count query: {}", e)))
}

/// Truncate the daily table (test cleanup).
pub async fn truncate_table(client: &ClickHouseClient) -> Result<()> {
    let sql = format!("TRUNCATE TABLE IF EXISTS {}", client.table());
    client
        .inner()
        .query(&sql)
        .execute()
        .await
        .map_err(|e| Error::database(format!("truncate: {}", e)))
}
