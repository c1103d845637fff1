//! USD valuation of positions.
//!
//! Values are 18-decimal USD. Collateral is discounted by its cFactor and
//! rounded down, debt is inflated by its k-factor and rounded up, so the
//! protocol view of an account is never more favorable than the market view.

use alloy::primitives::{Address, U256};
use tracing::warn;

use crate::config::Parameters;
use crate::error::{KreskoError, Result};
use crate::ledger::Account;
use crate::math::{amount_for_usd, mul_div, usd_wad, wad_mul_up, Rounding, WAD};
use crate::registry::{AssetRegistry, CollateralAsset, KrAsset, PricedAsset};
use crate::stability;
use kresko_chain::PriceOracle;

/// Read-only valuation context for one point in time.
#[derive(Debug, Clone, Copy)]
pub struct Valuation<'a> {
    pub registry: &'a AssetRegistry,
    pub oracle: &'a dyn PriceOracle,
    pub params: &'a Parameters,
    pub now: u64,
}

impl<'a> Valuation<'a> {
    pub fn new(
        registry: &'a AssetRegistry,
        oracle: &'a dyn PriceOracle,
        params: &'a Parameters,
        now: u64,
    ) -> Self {
        Self {
            registry,
            oracle,
            params,
            now,
        }
    }

    /// Validated oracle price (8 decimals).
    pub fn price<A: PricedAsset>(&self, asset: &A) -> Result<U256> {
        let data = self.oracle.price(asset.oracle())?;
        if !self.oracle.validate_price(data.price) {
            warn!(asset = %asset.address(), price = %data.price, "Rejected oracle price");
            return Err(KreskoError::InvalidPrice(asset.address()));
        }
        let max_age = self.params.oracle_staleness_secs;
        if max_age > 0 && data.is_stale(max_age, self.now) {
            let age_secs = data.age_secs(self.now);
            warn!(asset = %asset.address(), age_secs, "Rejected stale oracle price");
            return Err(KreskoError::StalePrice {
                asset: asset.address(),
                age_secs,
            });
        }
        Ok(data.price)
    }

    /// USD value of an external amount.
    pub fn value_of<A: PricedAsset>(
        &self,
        asset: &A,
        amount: U256,
        ignore_factor: bool,
        rounding: Rounding,
    ) -> Result<U256> {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        let value = usd_wad(amount, self.price(asset)?, asset.decimals(), rounding)?;
        if ignore_factor {
            Ok(value)
        } else {
            mul_div(value, asset.factor(), WAD, rounding)
        }
    }

    /// External amount worth `value`.
    pub fn amount_for<A: PricedAsset>(
        &self,
        asset: &A,
        value: U256,
        ignore_factor: bool,
        rounding: Rounding,
    ) -> Result<U256> {
        if value.is_zero() {
            return Ok(U256::ZERO);
        }
        let value = if ignore_factor {
            value
        } else {
            mul_div(value, WAD, asset.factor(), rounding)?
        };
        amount_for_usd(value, self.price(asset)?, asset.decimals(), rounding)
    }

    /// Externally observed amount of a collateral deposit (rounded down).
    pub fn collateral_external(&self, asset: &Address, anchor: U256) -> Result<U256> {
        self.registry
            .rebase_of(asset)
            .to_external(anchor, Rounding::Down)
            .ok_or(KreskoError::MathOverflow)
    }

    /// Externally observed amount of a debt position (rounded up).
    pub fn debt_external(&self, asset: &Address, anchor: U256) -> Result<U256> {
        self.registry
            .rebase_of(asset)
            .to_external(anchor, Rounding::Up)
            .ok_or(KreskoError::MathOverflow)
    }

    /// Value of a collateral deposit held in anchor units.
    pub fn collateral_value(&self, asset: &CollateralAsset, anchor: U256, ignore_factor: bool) -> Result<U256> {
        let external = self.collateral_external(&asset.address, anchor)?;
        self.value_of(asset, external, ignore_factor, Rounding::Down)
    }

    /// Value of a debt position held in anchor units.
    pub fn debt_value(&self, asset: &KrAsset, anchor: U256, ignore_factor: bool) -> Result<U256> {
        let external = self.debt_external(&asset.address, anchor)?;
        self.value_of(asset, external, ignore_factor, Rounding::Up)
    }

    /// Protocol collateral value of an account (cFactor applied).
    pub fn account_collateral_value(&self, account: &Account) -> Result<U256> {
        account.deposits().try_fold(U256::ZERO, |total, (asset, amount)| {
            let collateral = self.registry.collateral(&asset)?;
            let value = self.collateral_value(collateral, amount, false)?;
            total.checked_add(value).ok_or(KreskoError::MathOverflow)
        })
    }

    /// Protocol debt value of an account (k-factor applied).
    ///
    /// Uses the stored amounts; callers accrue positions first.
    pub fn account_debt_value(&self, account: &Account) -> Result<U256> {
        account.debts().try_fold(U256::ZERO, |total, (asset, position)| {
            let kr_asset = self.registry.kresko_asset(&asset)?;
            let value = self.debt_value(kr_asset, position.amount, false)?;
            total.checked_add(value).ok_or(KreskoError::MathOverflow)
        })
    }

    /// Collateral value needed to back the account's debt at `ratio`.
    pub fn min_collateral_at_ratio(&self, account: &Account, ratio: U256) -> Result<U256> {
        wad_mul_up(self.account_debt_value(account)?, ratio)
    }

    /// Market price over oracle price (RAY), when both are available.
    pub fn price_rate(&self, asset: &KrAsset) -> Option<U256> {
        let market = self.oracle.market_price(asset.oracle)?;
        let oracle_price = self.price(asset).ok()?;
        stability::price_rate(market, oracle_price).ok()
    }

    /// Deposit with the largest market value (cFactor ignored).
    pub fn largest_collateral(&self, account: &Account) -> Result<Option<(Address, U256)>> {
        let mut largest: Option<(Address, U256)> = None;
        for (asset, amount) in account.deposits() {
            let collateral = self.registry.collateral(&asset)?;
            let value = self.collateral_value(collateral, amount, true)?;
            if largest.map_or(true, |(_, best)| value > best) {
                largest = Some((asset, value));
            }
        }
        Ok(largest)
    }
}
