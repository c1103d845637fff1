//! In-memory price feed used by simulations and tests.

use super::{OracleError, PriceData, PriceOracle};
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use tracing::debug;

/// Feed entry for one oracle reference.
#[derive(Debug, Clone)]
struct FeedEntry {
    price: PriceData,
    market_open: bool,
    market_price: Option<U256>,
}

/// Price feed backed by a concurrent map keyed by oracle address.
///
/// Prices can be pushed while an engine holds a shared handle to the feed.
#[derive(Debug, Default)]
pub struct InMemoryOracle {
    feeds: DashMap<Address, FeedEntry>,
}

impl InMemoryOracle {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a price (8 decimals) observed at `timestamp`.
    pub fn set_price(&self, oracle: Address, price: U256, timestamp: u64) {
        let data = PriceData::new(price, timestamp);
        self.feeds
            .entry(oracle)
            .and_modify(|entry| entry.price = data)
            .or_insert(FeedEntry {
                price: data,
                market_open: true,
                market_price: None,
            });

        debug!(oracle = %oracle, price = data.price_f64(), timestamp, "Updated price feed");
    }

    /// Open or close the underlying market.
    pub fn set_market_open(&self, oracle: Address, open: bool) {
        if let Some(mut entry) = self.feeds.get_mut(&oracle) {
            entry.market_open = open;
        }
    }

    /// Set the secondary market (AMM) price, 8 decimals.
    pub fn set_market_price(&self, oracle: Address, price: Option<U256>) {
        if let Some(mut entry) = self.feeds.get_mut(&oracle) {
            entry.market_price = price;
        }
    }

    /// Get number of registered feeds.
    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }
}

impl PriceOracle for InMemoryOracle {
    fn price(&self, oracle: Address) -> Result<PriceData, OracleError> {
        self.feeds
            .get(&oracle)
            .map(|entry| entry.price)
            .ok_or(OracleError::NoFeed(oracle))
    }

    fn is_market_open(&self, oracle: Address) -> bool {
        self.feeds.get(&oracle).map(|e| e.market_open).unwrap_or(false)
    }

    fn market_price(&self, oracle: Address) -> Option<U256> {
        self.feeds.get(&oracle).and_then(|e| e.market_price)
    }
}
