//! The market data seam consumed by the task processor.

use async_trait::async_trait;
use chrono::NaiveDate;
use sync_core::{Coin, Result};

use crate::types::{CoinStatus, MarketChart};

/// Remote source of coin lists and ranged daily series.
///
/// Failures surface as `sync_core::Error` values carrying the HTTP status
/// (0 for transport failures) and a truncated body.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// List coins with the given status.
    async fn list_coins(&self, status: CoinStatus) -> Result<Vec<Coin>>;

    /// Fetch the three series for `[from, to]` quoted in `vs_currency`.
    async fn fetch_range(
        &self,
        coin_id: &str,
        vs_currency: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: &str,
    ) -> Result<MarketChart>;
}
