//! Response types.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use sync_core::{Coin, Error};

/// Which list endpoint variant to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinStatus {
    Active,
    Inactive,
}

impl CoinStatus {
    /// Query value for the `status` parameter; active is the API default.
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            Self::Active => None,
            Self::Inactive => Some("inactive"),
        }
    }
}

/// The three metrics a range response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Price,
    MarketCap,
    Volume,
}

/// `market_chart/range` payload: three independently sized series of
/// `[timestamp_ms, value]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MarketChart {
    #[serde(default)]
    pub prices: Vec<Vec<f64>>,
    #[serde(default)]
    pub market_caps: Vec<Vec<f64>>,
    #[serde(default)]
    pub total_volumes: Vec<Vec<f64>>,
}

impl MarketChart {
    /// Build from `(timestamp_ms, value)` pairs per metric.
    pub fn from_samples(
        prices: &[(i64, f64)],
        market_caps: &[(i64, f64)],
        total_volumes: &[(i64, f64)],
    ) -> Self {
        let rows = |s: &[(i64, f64)]| s.iter().map(|&(ms, v)| vec![ms as f64, v]).collect();
        Self {
            prices: rows(prices),
            market_caps: rows(market_caps),
            total_volumes: rows(total_volumes),
        }
    }

    /// Samples of one metric in response order. Rows shorter than two
    /// elements are skipped.
    pub fn samples(&self, metric: Metric) -> impl Iterator<Item = (i64, f64)> + '_ {
        let rows = match metric {
            Metric::Price => &self.prices,
            Metric::MarketCap => &self.market_caps,
            Metric::Volume => &self.total_volumes,
        };
        rows.iter()
            .filter(|row| row.len() >= 2)
            .map(|row| (row[0] as i64, row[1]))
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty() && self.market_caps.is_empty() && self.total_volumes.is_empty()
    }
}

/// Decode a JSON body, mapping failures to a non-retryable decode error.
pub(crate) fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| {
        Error::decode(
            status,
            format!("{}; body={}", e, sync_core::error::truncate(body, 300)),
        )
    })
}

/// Parse a `coins/list` body.
pub fn parse_coin_list(status: u16, body: &str) -> Result<Vec<Coin>, Error> {
    decode(status, body)
}
