//! Scheduling and reconciliation engine for the market sync.
//!
//! - Processor (fetch, aggregate, diff, insert, verify for one window)
//! - Pool (bounded worker pool) and dispatch (retry-first drive loop)
//! - Backfill (per-coin backward search state machine)
//! - Incremental (forward gap fill per sync interval)
//! - Scheduler (backfill once, then incremental passes)

pub mod backfill;
pub mod catalog;
pub mod dispatch;
pub mod incremental;
pub mod pool;
pub mod processor;
pub mod scheduler;

pub use backfill::{BackfillReport, BackfillScheduler, BackfillSettings, CoinPhase, CoinState};
pub use catalog::{load_catalog, Catalog};
pub use dispatch::{DispatchStats, TaskQueue};
pub use incremental::{build_incremental_tasks, IncrementalScheduler, PassSummary};
pub use pool::{PoolConfig, WorkerPool};
pub use processor::{backoff_delay, ProcessorConfig, TaskHandler, TaskProcessor};
pub use scheduler::*;
