//! CoinGecko configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// CoinGecko client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CoinGeckoConfig {
    /// API base URL, including the version path
    #[serde(default = "default_base_url")]
    #[validate(url)]
    pub base_url: String,
    /// API key (empty for the public tier)
    #[serde(default)]
    pub api_key: String,
    /// Header carrying the API key
    #[serde(default = "default_api_key_header")]
    #[validate(length(min = 1))]
    pub api_key_header: String,
    /// Quote currency for every series
    #[serde(default = "default_vs_currency")]
    #[validate(length(min = 1))]
    pub vs_currency: String,
    /// Sampling interval passed to the range endpoint
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// Sustained requests per second across all workers
    #[serde(default = "default_rps")]
    #[validate(range(min = 0.001))]
    pub requests_per_second: f64,
    /// Requests allowed in a burst
    #[serde(default = "default_burst")]
    #[validate(range(min = 1))]
    pub burst: u32,
    /// Comma-separated coin id allow-list; empty syncs every coin
    #[serde(default)]
    pub coin_ids: String,
}

fn default_base_url() -> String {
    "https://pro-api.coingecko.com/api/v3".to_string()
}

fn default_api_key_header() -> String {
    "x-cg-pro-api-key".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_interval() -> String {
    "daily".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_rps() -> f64 {
    6.0
}

fn default_burst() -> u32 {
    12
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            api_key_header: default_api_key_header(),
            vs_currency: default_vs_currency(),
            interval: default_interval(),
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_rps(),
            burst: default_burst(),
            coin_ids: String::new(),
        }
    }
}
