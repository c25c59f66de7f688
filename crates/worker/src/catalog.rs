//! Coin catalog loading at startup.

use std::collections::{BTreeMap, HashSet};

use coingecko::{CoinStatus, MarketDataApi};
use sync_core::{Coin, CoinFilter};
use telemetry::health;
use tracing::{info, warn};

/// The two populations the sync works over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    /// Active then inactive coins, deduplicated by id: the backfill population
    pub all: Vec<Coin>,
    /// Authoritative active list: the incremental population
    pub active: Vec<Coin>,
}

impl Catalog {
    /// Incremental population, falling back to coins the backfill saw live
    /// when the authoritative list is empty.
    pub fn incremental_coins(&self, detected: &BTreeMap<String, Coin>) -> Vec<Coin> {
        if !self.active.is_empty() {
            return self.active.clone();
        }
        if !detected.is_empty() {
            info!(coins = detected.len(), "Active list empty, using coins detected live during backfill");
        }
        detected.values().cloned().collect()
    }
}

/// Trim entries, drop empty ids and filtered-out coins.
fn clean(coins: Vec<Coin>, filter: &CoinFilter) -> Vec<Coin> {
    coins
        .iter()
        .map(Coin::trimmed)
        .filter(|c| !c.id.is_empty() && filter.allows(&c.id))
        .collect()
}

/// Active first, then inactive, keeping the first entry per id.
pub fn merge_lists(active: &[Coin], inactive: &[Coin]) -> Vec<Coin> {
    let mut seen = HashSet::new();
    active
        .iter()
        .chain(inactive)
        .filter(|c| seen.insert(c.id.clone()))
        .cloned()
        .collect()
}

async fn list(api: &dyn MarketDataApi, status: CoinStatus, filter: &CoinFilter) -> Option<Vec<Coin>> {
    match api.list_coins(status).await {
        Ok(coins) => Some(clean(coins, filter)),
        Err(e) => {
            warn!(status = ?status, http_status = e.status(), "Coin list failed: {}", e);
            None
        }
    }
}

/// Fetch both lists. A failed list counts as empty.
pub async fn load_catalog(api: &dyn MarketDataApi, filter: &CoinFilter) -> Catalog {
    let active = list(api, CoinStatus::Active, filter).await;
    let inactive = list(api, CoinStatus::Inactive, filter).await;

    match (&active, &inactive) {
        (None, None) => health().coingecko.set_unhealthy("coin lists unavailable"),
        _ => health().coingecko.set_healthy(),
    }

    let active = merge_lists(&active.unwrap_or_default(), &[]);
    let inactive = inactive.unwrap_or_default();
    let all = merge_lists(&active, &inactive);
    info!(
        active = active.len(),
        inactive = inactive.len(),
        total = all.len(),
        filtered = !filter.is_unrestricted(),
        "Coin catalog loaded"
    );

    Catalog { all, active }
}
