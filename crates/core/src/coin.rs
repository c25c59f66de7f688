//! Tracked entities.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A tracked coin as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
}

impl Coin {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: String::new(),
        }
    }

    /// Copy with surrounding whitespace removed from id and symbol.
    pub fn trimmed(&self) -> Self {
        Self {
            id: self.id.trim().to_string(),
            symbol: self.symbol.trim().to_string(),
            name: self.name.clone(),
        }
    }

    /// Symbol used on tasks and rows: upper-cased, falling back to the id.
    pub fn display_symbol(&self) -> String {
        let symbol = self.symbol.trim();
        if symbol.is_empty() {
            self.id.trim().to_uppercase()
        } else {
            symbol.to_uppercase()
        }
    }
}

/// Optional allow-list of coin ids. `None` admits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinFilter(Option<HashSet<String>>);

impl CoinFilter {
    /// Build from a comma-separated list; blank input admits everything.
    pub fn from_csv(csv: &str) -> Self {
        let ids: HashSet<String> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            Self(None)
        } else {
            Self(Some(ids))
        }
    }

    pub fn allows(&self, id: &str) -> bool {
        match &self.0 {
            Some(ids) => ids.contains(id),
            None => true,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0.is_none()
    }
}
