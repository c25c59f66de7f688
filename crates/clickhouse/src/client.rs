//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use std::sync::Arc;
use sync_core::Result;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::info;

/// ClickHouse client wrapper with a bounded number of concurrent queries.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
    permits: Arc<Semaphore>,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client bound to the configured database.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let client = base_client(&config).with_database(&config.database);

        info!(
            url = %config.url,
            database = %config.database,
            table = %config.table,
            pool_size = config.pool_size,
            "Created ClickHouse client"
        );

        Ok(Self {
            inner: client,
            permits: Arc::new(Semaphore::new(config.pool_size.max(1))),
            config,
        })
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Client without a database binding, for `CREATE DATABASE`.
    pub fn admin(&self) -> Client {
        base_client(&self.config)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Table holding daily records.
    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Waits for a query slot.
    pub(crate) async fn slot(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| sync_core::Error::internal("ClickHouse query slots closed"))
    }
}

fn base_client(config: &ClickHouseConfig) -> Client {
    let mut client = Client::default()
        .with_url(&config.url)
        .with_option("max_execution_time", config.timeout_secs.to_string());

    if let Some(ref user) = config.username {
        client = client.with_user(user);
    }

    if let Some(ref pass) = config.password {
        client = client.with_password(pass);
    }

    client
}
