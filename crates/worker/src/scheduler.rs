//! Top-level sync loop: one backfill, then an incremental pass per interval.

use std::sync::Arc;
use std::time::Duration;

use clickhouse_client::DayStore;
use coingecko::MarketDataApi;
use sync_core::{CoinFilter, Error, Result};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backfill::{BackfillReport, BackfillScheduler, BackfillSettings};
use crate::catalog::{load_catalog, Catalog};
use crate::incremental::IncrementalScheduler;
use crate::pool::{PoolConfig, WorkerPool};
use crate::processor::{ProcessorConfig, TaskProcessor};

/// Sync loop configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workers: usize,
    pub processor: ProcessorConfig,
    pub backfill: BackfillSettings,
    pub filter: CoinFilter,
    /// Time between incremental pass starts
    pub sync_every: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            processor: ProcessorConfig::default(),
            backfill: BackfillSettings::default(),
            filter: CoinFilter::default(),
            sync_every: Duration::from_secs(6 * 3600),
        }
    }
}

/// Owns the pool and runs both phases on it, strictly one after another.
pub struct SyncScheduler {
    api: Arc<dyn MarketDataApi>,
    store: Arc<dyn DayStore>,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(
        api: Arc<dyn MarketDataApi>,
        store: Arc<dyn DayStore>,
        config: SyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            store,
            config,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// Cancellation during backfill surfaces as `Error::Cancelled`; once the
    /// incremental loop is reached it ends with `Ok(())`.
    pub async fn run(&self) -> Result<()> {
        let catalog = load_catalog(self.api.as_ref(), &self.config.filter).await;

        let processor = TaskProcessor::new(
            self.api.clone(),
            self.store.clone(),
            self.config.processor.clone(),
            self.cancel.clone(),
        );
        let mut pool = WorkerPool::start(
            PoolConfig::new(self.config.workers),
            Arc::new(processor),
            self.cancel.clone(),
        );

        let outcome = self.run_phases(&mut pool, &catalog).await;
        pool.shutdown().await;
        outcome
    }

    async fn run_phases(&self, pool: &mut WorkerPool, catalog: &Catalog) -> Result<()> {
        let backfill = BackfillScheduler::new(self.store.clone(), self.config.backfill.clone());
        let BackfillReport { active, .. } = backfill.run(pool, &catalog.all).await?;

        let coins = catalog.incremental_coins(&active);
        info!(coins = coins.len(), "Incremental target set");

        let incremental = IncrementalScheduler::new(
            self.store.clone(),
            self.config.filter.clone(),
            self.config.processor.max_retries,
            self.config.processor.horizon,
        );

        let mut ticker = interval(self.config.sync_every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if coins.is_empty() {
                warn!("Incremental pass has no active coins");
                continue;
            }

            match incremental.run_once(pool, &coins).await {
                Ok(_) => {}
                Err(Error::Cancelled) => break,
                Err(e) => error!("Incremental pass error: {}", e),
            }
        }

        info!("Sync loop stopped");
        Ok(())
    }
}
