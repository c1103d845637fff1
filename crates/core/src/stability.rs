//! Stability rate (interest) accrual for Kresko assets.
//!
//! Each Kresko asset carries a RAY debt index that starts at 1.0 and only
//! grows. The annual rate comes from a piecewise-linear curve over the price
//! rate (AMM market price over oracle price): when the synthetic trades at or
//! above its oracle price the base rate applies, below it the rate ramps up
//! with `rate_slope1` inside `price_rate_delta` and with `rate_slope2`
//! beyond. Indices accrue lazily when an operation touches the asset; the
//! rate used for a period is the one computed at the start of it.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{KreskoError, Result};
use crate::math::{mul_div, ray_mul, Rounding, RAY, SECONDS_PER_YEAR};

/// Curve parameters, all RAY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityRateConfig {
    /// Annual rate applied when the price rate is at or above optimal
    pub stability_rate_base: U256,
    /// Slope inside the delta band below optimal
    pub rate_slope1: U256,
    /// Slope beyond the delta band
    pub rate_slope2: U256,
    /// Target price rate (normally 1.0)
    pub optimal_price_rate: U256,
    /// Width of the first band below optimal
    pub price_rate_delta: U256,
}

impl Default for StabilityRateConfig {
    fn default() -> Self {
        let per_mille = RAY / U256::from(1_000u64);
        Self {
            stability_rate_base: per_mille * U256::from(5u64),
            rate_slope1: per_mille * U256::from(100u64),
            rate_slope2: RAY * U256::from(5u64),
            optimal_price_rate: RAY,
            price_rate_delta: per_mille * U256::from(25u64),
        }
    }
}

impl StabilityRateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.optimal_price_rate.is_zero() {
            return Err(KreskoError::InvalidParameter(
                "optimal price rate must be positive".to_string(),
            ));
        }
        if self.price_rate_delta > self.optimal_price_rate {
            return Err(KreskoError::InvalidParameter(
                "price rate delta exceeds the optimal price rate".to_string(),
            ));
        }
        if self.stability_rate_base > RAY {
            return Err(KreskoError::InvalidParameter(
                "base stability rate above 100%".to_string(),
            ));
        }
        Ok(())
    }

    /// Annual rate (RAY) for a given price rate.
    pub fn rate_for(&self, price_rate: U256) -> Result<U256> {
        if price_rate >= self.optimal_price_rate {
            return Ok(self.stability_rate_base);
        }

        let diff = self.optimal_price_rate - price_rate;
        let first_band = diff.min(self.price_rate_delta);
        let mut rate = self
            .stability_rate_base
            .checked_add(ray_mul(first_band, self.rate_slope1, Rounding::Up)?)
            .ok_or(KreskoError::MathOverflow)?;

        if diff > self.price_rate_delta {
            let excess = diff - self.price_rate_delta;
            rate = rate
                .checked_add(ray_mul(excess, self.rate_slope2, Rounding::Up)?)
                .ok_or(KreskoError::MathOverflow)?;
        }
        Ok(rate)
    }
}

/// Compound an annual RAY rate over `elapsed` seconds.
///
/// Three-term binomial expansion of `(1 + rate / year) ^ elapsed`. Slightly
/// undershoots the exact value for large rates and long gaps.
pub fn compounded_interest(rate: U256, elapsed: u64) -> Result<U256> {
    if elapsed == 0 || rate.is_zero() {
        return Ok(RAY);
    }

    let exp = U256::from(elapsed);
    let exp_minus_one = U256::from(elapsed - 1);
    let exp_minus_two = U256::from(elapsed.saturating_sub(2));

    let rate_per_second = rate / U256::from(SECONDS_PER_YEAR);
    let base_power_two = ray_mul(rate_per_second, rate_per_second, Rounding::Down)?;
    let base_power_three = ray_mul(base_power_two, rate_per_second, Rounding::Down)?;

    let second_term = exp
        .checked_mul(exp_minus_one)
        .and_then(|v| v.checked_mul(base_power_two))
        .ok_or(KreskoError::MathOverflow)?
        / U256::from(2u8);
    let third_term = exp
        .checked_mul(exp_minus_one)
        .and_then(|v| v.checked_mul(exp_minus_two))
        .and_then(|v| v.checked_mul(base_power_three))
        .ok_or(KreskoError::MathOverflow)?
        / U256::from(6u8);

    rate_per_second
        .checked_mul(exp)
        .and_then(|v| v.checked_add(RAY))
        .and_then(|v| v.checked_add(second_term))
        .and_then(|v| v.checked_add(third_term))
        .ok_or(KreskoError::MathOverflow)
}

/// Price rate in RAY: market price over oracle price.
pub fn price_rate(market_price: U256, oracle_price: U256) -> Result<U256> {
    mul_div(market_price, RAY, oracle_price, Rounding::Down)
}

/// Stability state of one Kresko asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityRate {
    pub config: StabilityRateConfig,
    /// Accumulated debt index (RAY)
    pub debt_index: U256,
    /// Annual rate in force since `last_update` (RAY)
    pub current_rate: U256,
    /// Unix timestamp of the last accrual
    pub last_update: u64,
}

impl StabilityRate {
    pub fn new(config: StabilityRateConfig, now: u64) -> Self {
        Self {
            config,
            debt_index: RAY,
            current_rate: config.stability_rate_base,
            last_update: now,
        }
    }

    /// Index as of `now` without mutating.
    pub fn projected_index(&self, now: u64) -> Result<U256> {
        let elapsed = now.saturating_sub(self.last_update);
        if elapsed == 0 {
            return Ok(self.debt_index);
        }
        ray_mul(
            self.debt_index,
            compounded_interest(self.current_rate, elapsed)?,
            Rounding::Up,
        )
    }

    /// Accrue to `now`, then reprice the rate from `price_rate`.
    pub fn accrue(&mut self, now: u64, price_rate: U256) -> Result<U256> {
        self.debt_index = self.projected_index(now)?;
        self.last_update = self.last_update.max(now);
        self.current_rate = self.config.rate_for(price_rate)?;
        Ok(self.debt_index)
    }
}

/// Stability state of every Kresko asset that has a rate.
///
/// Assets without an initialized rate keep a constant index of 1.0.
#[derive(Debug, Clone, Default)]
pub struct StabilityRates {
    rates: HashMap<Address, StabilityRate>,
}

impl StabilityRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, asset: &Address) -> Option<&StabilityRate> {
        self.rates.get(asset)
    }

    pub fn contains(&self, asset: &Address) -> bool {
        self.rates.contains_key(asset)
    }

    pub(crate) fn insert(&mut self, asset: Address, rate: StabilityRate) {
        self.rates.insert(asset, rate);
    }

    pub(crate) fn get_mut(&mut self, asset: &Address) -> Option<&mut StabilityRate> {
        self.rates.get_mut(asset)
    }

    /// Current index of `asset` projected to `now`.
    pub fn projected_index(&self, asset: &Address, now: u64) -> Result<U256> {
        match self.rates.get(asset) {
            Some(rate) => rate.projected_index(now),
            None => Ok(RAY),
        }
    }

    /// Accrue `asset` to `now` and return its index.
    ///
    /// `price_rate` is only consulted when the asset has a rate; callers pass
    /// `None` to keep the rate at its optimal-price value.
    pub fn accrue(&mut self, asset: &Address, now: u64, price_rate: Option<U256>) -> Result<U256> {
        let Some(rate) = self.rates.get_mut(asset) else {
            return Ok(RAY);
        };
        let price_rate = price_rate.unwrap_or(rate.config.optimal_price_rate);
        let index = rate.accrue(now, price_rate)?;
        debug!(
            asset = %asset,
            debt_index = %index,
            rate = %rate.current_rate,
            "Accrued debt index"
        );
        Ok(index)
    }
}
