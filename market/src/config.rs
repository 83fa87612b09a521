//! Configuration for the market ledger.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Log filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Buffered events per subscriber before slow receivers start lagging
    pub event_capacity: usize,
    /// Largest number of cards a single batch mint may create
    pub max_batch_mint: usize,
    /// File journal location; `None` keeps the journal in memory
    pub journal_path: Option<PathBuf>,
    /// Account that owns freshly minted cards
    pub inventory_account: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            event_capacity: 256,
            max_batch_mint: 100,
            journal_path: None,
            inventory_account: "inventory".to_string(),
        }
    }
}

impl MarketConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("MARKET_LOG_LEVEL").unwrap_or(defaults.log_level),
            event_capacity: lookup("MARKET_EVENT_CAPACITY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_capacity),
            max_batch_mint: lookup("MARKET_MAX_BATCH_MINT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_batch_mint),
            journal_path: lookup("MARKET_JOURNAL_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            inventory_account: lookup("MARKET_INVENTORY_ACCOUNT")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.inventory_account),
        }
    }

    /// Set the event channel capacity
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the batch mint limit
    #[must_use]
    pub const fn with_max_batch_mint(mut self, limit: usize) -> Self {
        self.max_batch_mint = limit;
        self
    }

    /// Set the file journal location
    #[must_use]
    pub fn with_journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn missing_variables_use_defaults() {
        let config = MarketConfig::from_lookup(lookup(&[]));
        assert_eq!(config, MarketConfig::default());
        assert_eq!(config.event_capacity, 256);
        assert!(config.journal_path.is_none());
    }

    #[test]
    fn variables_override_defaults() {
        let config = MarketConfig::from_lookup(lookup(&[
            ("MARKET_LOG_LEVEL", "debug"),
            ("MARKET_EVENT_CAPACITY", "16"),
            ("MARKET_MAX_BATCH_MINT", "6"),
            ("MARKET_JOURNAL_PATH", "/var/lib/market/journal.bin"),
            ("MARKET_INVENTORY_ACCOUNT", "0xF00D"),
        ]));

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.max_batch_mint, 6);
        assert_eq!(
            config.journal_path,
            Some(PathBuf::from("/var/lib/market/journal.bin"))
        );
        assert_eq!(config.inventory_account, "0xF00D");
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = MarketConfig::from_lookup(lookup(&[
            ("MARKET_EVENT_CAPACITY", "lots"),
            ("MARKET_JOURNAL_PATH", "  "),
        ]));
        assert_eq!(config.event_capacity, 256);
        assert!(config.journal_path.is_none());
    }
}
