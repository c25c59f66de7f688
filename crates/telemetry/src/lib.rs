//! Internal telemetry for the market sync engine.
//!
//! Metrics stay in-process and are logged as snapshots at the end of each
//! backfill round and incremental pass.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
