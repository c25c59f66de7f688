//! ClickHouse table schema.
//!
//! One row per coin-day. `_date` is derived from the sample timestamp and
//! drives both partitioning and the day lookups used for dedup.

/// DDL for the daily records table; `{table}` is substituted.
const CREATE_DAILY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {table}
(
    _date       Date DEFAULT toDate(timestamp),
    id          LowCardinality(String),
    symbol      LowCardinality(String),
    vs_currency LowCardinality(String),
    timestamp   DateTime64(3, 'UTC'),
    price       Float64,
    market_cap  Float64,
    volume      Float64
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(_date)
ORDER BY (_date, id, symbol, vs_currency, timestamp)
SETTINGS index_granularity = 8192
"#;

/// DDL for the daily records table.
pub fn create_daily_table(table: &str) -> String {
    CREATE_DAILY_TABLE.replace("{table}", table)
}

/// DDL for the database.
pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", database)
}
