//! Daily records landed in storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One coin-day: the last price, market cap, and volume seen for the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub id: String,
    pub symbol: String,
    pub vs_currency: String,
    pub day: NaiveDate,
    /// Latest sample timestamp observed for the day across all metrics.
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub market_cap: f64,
    pub volume: f64,
}
