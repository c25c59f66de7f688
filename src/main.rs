//! Market Sync
//!
//! Keeps a ClickHouse table of daily CoinGecko market history complete:
//! - Backward backfill discovering each coin's full history
//! - Recurring incremental passes fetching only new days
//! - Post-insert verification with bounded window retries

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use validator::Validate;

use clickhouse_client::{ClickHouseClient, ClickHouseConfig, DayStore};
use coingecko::{CoinGeckoClient, CoinGeckoConfig};
use sync_core::{parse_date, CoinFilter, Error, Horizon};
use telemetry::{health, init_tracing_from_env};
use worker::{BackfillSettings, ProcessorConfig, SyncConfig, SyncScheduler};

/// Scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct SyncSettings {
    #[serde(default = "default_workers")]
    #[validate(range(min = 1))]
    workers: usize,
    /// Earliest day backfill may reach, `YYYY-MM-DD`
    #[serde(default = "default_start_date")]
    #[validate(length(min = 10))]
    start_date: String,
    #[serde(default = "default_empty_stop_blocks")]
    #[validate(range(min = 1))]
    empty_stop_blocks: u32,
    #[serde(default = "default_max_search_blocks")]
    #[validate(range(min = 1))]
    max_search_blocks: u32,
    #[serde(default = "default_max_retries")]
    max_retries_per_block: u32,
    #[serde(default = "default_sync_every_secs")]
    #[validate(range(min = 1))]
    sync_every_secs: u64,
}

fn default_workers() -> usize {
    8
}

fn default_start_date() -> String {
    "2018-01-01".to_string()
}

fn default_empty_stop_blocks() -> u32 {
    2
}

fn default_max_search_blocks() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_sync_every_secs() -> u64 {
    6 * 3600
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            start_date: default_start_date(),
            empty_stop_blocks: default_empty_stop_blocks(),
            max_search_blocks: default_max_search_blocks(),
            max_retries_per_block: default_max_retries(),
            sync_every_secs: default_sync_every_secs(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
struct Config {
    #[serde(default)]
    #[validate(nested)]
    coingecko: CoinGeckoConfig,

    #[serde(default)]
    #[validate(nested)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    #[validate(nested)]
    sync: SyncSettings,
}

impl Config {
    fn sync_config(&self) -> Result<SyncConfig> {
        let start_date = parse_date(&self.sync.start_date).context("Invalid START_DATE")?;
        Ok(SyncConfig {
            workers: self.sync.workers,
            processor: ProcessorConfig {
                vs_currency: self.coingecko.vs_currency.clone(),
                interval: self.coingecko.interval.clone(),
                max_retries: self.sync.max_retries_per_block,
                horizon: Horizon::System,
                ..Default::default()
            },
            backfill: BackfillSettings {
                start_date,
                empty_stop_blocks: self.sync.empty_stop_blocks,
                max_search_blocks: self.sync.max_search_blocks,
                max_retries: self.sync.max_retries_per_block,
                horizon: Horizon::System,
            },
            filter: CoinFilter::from_csv(&self.coingecko.coin_ids),
            sync_every: Duration::from_secs(self.sync.sync_every_secs),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Market Sync v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config()?;
    // One storage slot per worker
    config.clickhouse.pool_size = config.sync.workers;
    let sync_config = config.sync_config()?;

    info!(
        base_url = %config.coingecko.base_url,
        clickhouse = %config.clickhouse.url,
        database = %config.clickhouse.database,
        table = %config.clickhouse.table,
        workers = config.sync.workers,
        start_date = %sync_config.backfill.start_date,
        rps = config.coingecko.requests_per_second,
        burst = config.coingecko.burst,
        filtered = !sync_config.filter.is_unrestricted(),
        "Loaded configuration"
    );

    let clickhouse = Arc::new(
        ClickHouseClient::new(config.clickhouse.clone())
            .context("Failed to create ClickHouse client")?,
    );

    if clickhouse_client::health::check_connection(&clickhouse).await {
        health().clickhouse.set_healthy();
        info!("ClickHouse connection: healthy");
    } else {
        health().clickhouse.set_unhealthy("Connection failed");
        bail!("ClickHouse is unreachable at {}", config.clickhouse.url);
    }

    clickhouse
        .ensure_schema(&config.clickhouse.table)
        .await
        .context("Failed to initialize ClickHouse schema")?;

    let coingecko = Arc::new(
        CoinGeckoClient::new(config.coingecko.clone()).context("Failed to create CoinGecko client")?,
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received");
        signal_token.cancel();
    });

    let scheduler = SyncScheduler::new(coingecko, clickhouse, sync_config, cancel);
    match scheduler.run().await {
        Ok(()) | Err(Error::Cancelled) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            Err(anyhow::Error::from(e).context("Sync failed"))
        }
    }
}

/// Load configuration from defaults, file, and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("SYNC")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    apply_env_overrides(&mut config)?;

    config
        .validate()
        .map_err(|e| Error::config(e.to_string()))
        .context("Invalid configuration")?;

    Ok(config)
}

/// Flat environment names the service has always accepted.
fn apply_env_overrides(config: &mut Config) -> Result<()> {
    let cg = &mut config.coingecko;
    if let Some(v) = env_var("COINGECKO_BASE_URL") {
        cg.base_url = v;
    }
    if let Some(v) = env_var("COINGECKO_API_KEY") {
        cg.api_key = v;
    }
    if let Some(v) = env_var("COINGECKO_API_KEY_HEADER") {
        cg.api_key_header = v;
    }
    if let Some(v) = env_var("COINGECKO_VS_CURRENCY") {
        cg.vs_currency = v;
    }
    if let Some(v) = env_var("COINGECKO_INTERVAL") {
        cg.interval = v;
    }
    if let Some(v) = env_parse("COINGECKO_TIMEOUT_SECS")? {
        cg.timeout_secs = v;
    }
    if let Some(v) = env_parse("COINGECKO_RPS")? {
        cg.requests_per_second = v;
    }
    if let Some(v) = env_parse("COINGECKO_BURST")? {
        cg.burst = v;
    }
    if let Some(v) = env_var("COINGECKO_IDS") {
        cg.coin_ids = v;
    }

    let ch = &mut config.clickhouse;
    if let Some(url) = env_var("CLICKHOUSE_URL") {
        ch.url = url;
    } else if let Some(host) = env_var("CLICKHOUSE_HOST") {
        let port = env_var("CLICKHOUSE_PORT").unwrap_or_else(|| "8123".to_string());
        ch.url = clickhouse_url(&host, &port);
    }
    if let Some(v) = env_var("CLICKHOUSE_USER") {
        ch.username = Some(v);
    }
    if let Some(v) = env_var("CLICKHOUSE_PASSWORD") {
        ch.password = Some(v);
    }
    if let Some(v) = env_var("CLICKHOUSE_DATABASE") {
        ch.database = v;
    }
    if let Some(v) = env_var("CLICKHOUSE_TABLE") {
        ch.table = v;
    }

    let sync = &mut config.sync;
    if let Some(v) = env_parse("WORKERS")? {
        sync.workers = v;
    }
    if let Some(v) = env_var("START_DATE") {
        sync.start_date = v;
    }
    if let Some(v) = env_parse("EMPTY_STOP_BLOCKS")? {
        sync.empty_stop_blocks = v;
    }
    if let Some(v) = env_parse("MAX_SEARCH_BLOCKS")? {
        sync.max_search_blocks = v;
    }
    if let Some(v) = env_parse("MAX_RETRIES_PER_BLOCK")? {
        sync.max_retries_per_block = v;
    }
    if let Some(v) = env_parse("SYNC_EVERY_SECS")? {
        sync.sync_every_secs = v;
    }

    Ok(())
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::config(format!("{}={:?}: {}", key, raw, e)))
            .context("Invalid environment override"),
        None => Ok(None),
    }
}

/// HTTP endpoint from a bare host and port. Hosts given with a scheme are kept.
fn clickhouse_url(host: &str, port: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host, port.trim())
    } else {
        format!("http://{}:{}", host, port.trim())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
