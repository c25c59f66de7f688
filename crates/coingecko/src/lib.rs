//! CoinGecko client for the market sync engine.
//!
//! All outbound requests share one token bucket, so every worker holding a
//! clone of the client draws from the same request budget.

pub mod api;
pub mod client;
pub mod config;
pub mod types;

pub use api::*;
pub use client::*;
pub use config::*;
pub use types::*;
