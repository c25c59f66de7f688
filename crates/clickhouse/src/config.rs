//! ClickHouse configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[validate(url)]
    pub url: String,
    /// Database name
    #[serde(default = "default_database")]
    #[validate(length(min = 1))]
    pub database: String,
    /// Table holding daily records
    #[serde(default = "default_table")]
    #[validate(length(min = 1))]
    pub table: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Maximum concurrent queries; sized to the worker count at startup
    #[serde(default = "default_pool_size")]
    #[validate(range(min = 1))]
    pub pool_size: usize,
    /// Server-side query timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database() -> String {
    "default".to_string()
}

fn default_table() -> String {
    "coingecko_market_cap_daily".to_string()
}

fn default_pool_size() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            table: default_table(),
            username: None,
            password: None,
            pool_size: default_pool_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
