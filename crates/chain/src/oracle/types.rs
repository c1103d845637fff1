//! Oracle answer and error types.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Oracle price decimals (8)
pub const PRICE_DECIMALS: u8 = 8;

/// One oracle answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// USD price, 8 decimals
    pub price: U256,
    /// Unix timestamp of the answer
    pub timestamp: u64,
}

impl PriceData {
    pub fn new(price: U256, timestamp: u64) -> Self {
        Self { price, timestamp }
    }

    /// Price as f64 (logging only).
    pub fn price_f64(&self) -> f64 {
        let value: u128 = self.price.saturating_to();
        value as f64 / 10_f64.powi(PRICE_DECIMALS as i32)
    }

    /// Whether the answer is older than `max_age_secs` at `now`.
    pub fn is_stale(&self, max_age_secs: u64, now: u64) -> bool {
        self.age_secs(now) > max_age_secs
    }

    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Oracle lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("no price feed registered for oracle {0}")]
    NoFeed(Address),
}
