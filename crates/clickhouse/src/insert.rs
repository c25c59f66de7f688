//! Batch insert for daily records.

use crate::client::ClickHouseClient;
use clickhouse::Row;
use serde::Serialize;
use sync_core::{DailyRecord, Error, Result};
use telemetry::metrics;
use tracing::debug;

/// Row layout for the daily table. `_date` is filled by its column default.
#[derive(Debug, Clone, Row, Serialize)]
pub struct DailyRow {
    pub id: String,
    pub symbol: String,
    pub vs_currency: String,
    pub timestamp: i64, // DateTime64(3) as milliseconds
    pub price: f64,
    pub market_cap: f64,
    pub volume: f64,
}

impl From<&DailyRecord> for DailyRow {
    fn from(record: &DailyRecord) -> Self {
        Self {
            id: record.id.clone(),
            symbol: record.symbol.clone(),
            vs_currency: record.vs_currency.clone(),
            timestamp: record.timestamp.timestamp_millis(),
            price: record.price,
            market_cap: record.market_cap,
            volume: record.volume,
        }
    }
}

/// Insert records as a single batch. Any failure fails the whole batch.
pub async fn insert_daily_records(client: &ClickHouseClient, records: &[DailyRecord]) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    let count = records.len();
    let start = std::time::Instant::now();
    let fail = |stage: &str, e: clickhouse::error::Error| {
        metrics().insert_errors.inc();
        Error::database(format!("{} error: {}", stage, e))
    };

    let _slot = client.slot().await?;
    let mut insert = client
        .inner()
        .insert::<DailyRow>(client.table())
        .map_err(|e| fail("Insert", e))?;

    for record in records {
        insert
            .write(&DailyRow::from(record))
            .await
            .map_err(|e| fail("Write", e))?;
    }

    insert.end().await.map_err(|e| fail("End", e))?;

    let elapsed = start.elapsed();
    metrics().insert_latency_ms.observe(elapsed.as_millis() as u64);
    metrics().days_inserted.inc_by(count as u64);

    debug!(
        count = count,
        latency_ms = %elapsed.as_millis(),
        "Inserted daily records"
    );

    Ok(count)
}
