//! Oracle abstraction layer.
//!
//! The engine never stores prices. Every operation reads a fresh USD price
//! (8 decimals) through [`PriceOracle`] and validates it before use.
//!
//! # Example
//!
//! ```rust,ignore
//! use kresko_chain::oracle::{InMemoryOracle, PriceOracle};
//!
//! let feed = InMemoryOracle::new();
//! feed.set_price(oracle_address, U256::from(100_000_000u64), now);
//! let price = feed.price(oracle_address)?;
//! ```

mod feed;
mod types;

pub use feed::InMemoryOracle;
pub use types::{OracleError, PriceData, PRICE_DECIMALS};

use alloy::primitives::{Address, U256};
use std::fmt::Debug;

/// Synchronous price source consulted inside an engine operation.
pub trait PriceOracle: Send + Sync + Debug {
    /// Latest price for an oracle reference.
    fn price(&self, oracle: Address) -> Result<PriceData, OracleError>;

    /// Whether the underlying market is open for trading.
    fn is_market_open(&self, _oracle: Address) -> bool {
        true
    }

    /// Secondary market (AMM) price, 8 decimals, when one exists.
    fn market_price(&self, _oracle: Address) -> Option<U256> {
        None
    }

    /// Validate price against sanity checks.
    fn validate_price(&self, price: U256) -> bool {
        // Positive and below ~10^12 USD
        !price.is_zero() && price < U256::from(10u128.pow(20))
    }
}
