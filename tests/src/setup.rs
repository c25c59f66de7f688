//! Common test setup.

use std::sync::Arc;

use sync_core::Horizon;
use tokio_util::sync::CancellationToken;
use worker::{PoolConfig, ProcessorConfig, TaskProcessor, WorkerPool};

use crate::fixtures;
use crate::mocks::{MockApi, MockStore};

/// Mocks plus the token the processor and pool observe.
///
/// The real `TaskProcessor` and `WorkerPool` run on top, so every scheduler
/// path exercised here is the production one.
pub struct TestContext {
    pub api: Arc<MockApi>,
    pub store: Arc<MockStore>,
    pub cancel: CancellationToken,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            api: Arc::new(MockApi::new()),
            store: Arc::new(MockStore::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn processor_config(&self, max_retries: u32) -> ProcessorConfig {
        ProcessorConfig {
            max_retries,
            horizon: fixtures::horizon(),
            ..Default::default()
        }
    }

    pub fn processor(&self, max_retries: u32) -> TaskProcessor {
        TaskProcessor::new(
            self.api.clone(),
            self.store.clone(),
            self.processor_config(max_retries),
            self.cancel.clone(),
        )
    }

    /// Pool of `workers` real processors.
    pub fn pool(&self, workers: usize, max_retries: u32) -> WorkerPool {
        self.pool_with(PoolConfig::new(workers), max_retries)
    }

    pub fn pool_with(&self, config: PoolConfig, max_retries: u32) -> WorkerPool {
        WorkerPool::start(
            config,
            Arc::new(self.processor(max_retries)),
            self.cancel.clone(),
        )
    }

    pub fn horizon(&self) -> Horizon {
        fixtures::horizon()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
