//! Asset registry.
//!
//! Holds per-asset configuration for collateral assets and Kresko assets
//! (synthetics), plus the active rebase of every asset that rebased. An
//! address may be registered on both sides when a synthetic is also accepted
//! as collateral. Assets are never removed, only disabled.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::error::{KreskoError, Result};
use crate::math::{ONE_PERCENT, WAD};
use kresko_chain::Rebase;

/// Maximum liquidation incentive multiplier (1.25)
pub const MAX_LIQUIDATION_INCENTIVE: U256 = U256::from_limbs([1_250_000_000_000_000_000u64, 0, 0, 0]);

/// Maximum open/close fee (10%)
pub const MAX_FEE: U256 = U256::from_limbs([100_000_000_000_000_000u64, 0, 0, 0]);

/// Maximum supported token decimals
pub const MAX_DECIMALS: u8 = 18;

/// Common view over anything the valuation engine can price.
pub trait PricedAsset {
    /// Token address
    fn address(&self) -> Address;
    /// Token decimals
    fn decimals(&self) -> u8;
    /// Oracle reference used for price lookups
    fn oracle(&self) -> Address;
    /// Risk factor (cFactor or kFactor), WAD
    fn factor(&self) -> U256;
}

/// Collateral asset configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAsset {
    /// Token contract address
    pub address: Address,
    /// Asset symbol (e.g., "USDC", "krTSLA")
    pub symbol: String,
    /// Token decimals
    pub decimals: u8,
    /// Collateral factor (WAD, <= 1.0)
    pub factor: U256,
    /// Oracle reference
    pub oracle: Address,
    /// Anchor token for rebasing assets; marks the asset rebasing-sensitive
    pub anchor: Option<Address>,
    /// Liquidation incentive multiplier (WAD, 1.0..=1.25)
    pub liquidation_incentive: U256,
    /// Whether new deposits are accepted
    pub exists: bool,
}

impl CollateralAsset {
    /// Whether deposits are subject to the rebasing dust floor.
    pub fn is_rebasing(&self) -> bool {
        self.anchor.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.factor > WAD {
            return Err(KreskoError::InvalidParameter(format!(
                "{}: collateral factor above 1.0",
                self.symbol
            )));
        }
        if self.liquidation_incentive < WAD || self.liquidation_incentive > MAX_LIQUIDATION_INCENTIVE {
            return Err(KreskoError::InvalidParameter(format!(
                "{}: liquidation incentive outside 1.0..=1.25",
                self.symbol
            )));
        }
        validate_decimals(&self.symbol, self.decimals)
    }
}

impl PricedAsset for CollateralAsset {
    fn address(&self) -> Address {
        self.address
    }
    fn decimals(&self) -> u8 {
        self.decimals
    }
    fn oracle(&self) -> Address {
        self.oracle
    }
    fn factor(&self) -> U256 {
        self.factor
    }
}

/// Kresko asset (synthetic) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KrAsset {
    /// Token contract address
    pub address: Address,
    /// Asset symbol (e.g., "krETH")
    pub symbol: String,
    /// Token decimals
    pub decimals: u8,
    /// Debt risk factor (WAD, >= 1.0)
    pub k_factor: U256,
    /// Oracle reference
    pub oracle: Address,
    /// Anchor token (wrapped, non-rebasing representation)
    pub anchor: Option<Address>,
    /// Maximum external total supply
    pub supply_limit: U256,
    /// Fee on mint value (WAD)
    pub open_fee: U256,
    /// Fee on burn value (WAD)
    pub close_fee: U256,
    /// Whether new mints are accepted
    pub exists: bool,
}

impl KrAsset {
    fn validate(&self) -> Result<()> {
        if self.k_factor < WAD {
            return Err(KreskoError::InvalidParameter(format!(
                "{}: k-factor below 1.0",
                self.symbol
            )));
        }
        if self.open_fee > MAX_FEE || self.close_fee > MAX_FEE {
            return Err(KreskoError::InvalidParameter(format!(
                "{}: fee above {}%",
                self.symbol,
                MAX_FEE / ONE_PERCENT
            )));
        }
        validate_decimals(&self.symbol, self.decimals)
    }
}

impl PricedAsset for KrAsset {
    fn address(&self) -> Address {
        self.address
    }
    fn decimals(&self) -> u8 {
        self.decimals
    }
    fn oracle(&self) -> Address {
        self.oracle
    }
    fn factor(&self) -> U256 {
        self.k_factor
    }
}

fn validate_decimals(symbol: &str, decimals: u8) -> Result<()> {
    if decimals > MAX_DECIMALS {
        return Err(KreskoError::InvalidParameter(format!(
            "{symbol}: more than {MAX_DECIMALS} decimals"
        )));
    }
    Ok(())
}

/// Asset registry keyed by token address.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    collaterals: HashMap<Address, CollateralAsset>,
    kresko_assets: HashMap<Address, KrAsset>,
    rebases: HashMap<Address, Rebase>,
}

impl AssetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new collateral asset.
    pub fn add_collateral_asset(&mut self, asset: CollateralAsset) -> Result<()> {
        if self.collaterals.contains_key(&asset.address) {
            return Err(KreskoError::AssetExists(asset.address));
        }
        asset.validate()?;
        info!(
            asset = %asset.address,
            symbol = %asset.symbol,
            factor = %asset.factor,
            incentive = %asset.liquidation_incentive,
            "Added collateral asset"
        );
        self.collaterals.insert(asset.address, asset);
        Ok(())
    }

    /// Replace the configuration of an existing collateral asset.
    pub fn update_collateral_asset(&mut self, asset: CollateralAsset) -> Result<()> {
        if !self.collaterals.contains_key(&asset.address) {
            return Err(KreskoError::AssetNotFound(asset.address));
        }
        asset.validate()?;
        info!(asset = %asset.address, symbol = %asset.symbol, exists = asset.exists, "Updated collateral asset");
        self.collaterals.insert(asset.address, asset);
        Ok(())
    }

    /// Register a new Kresko asset.
    pub fn add_kresko_asset(&mut self, asset: KrAsset) -> Result<()> {
        if self.kresko_assets.contains_key(&asset.address) {
            return Err(KreskoError::AssetExists(asset.address));
        }
        asset.validate()?;
        info!(
            asset = %asset.address,
            symbol = %asset.symbol,
            k_factor = %asset.k_factor,
            supply_limit = %asset.supply_limit,
            "Added kresko asset"
        );
        self.kresko_assets.insert(asset.address, asset);
        Ok(())
    }

    /// Replace the configuration of an existing Kresko asset.
    pub fn update_kresko_asset(&mut self, asset: KrAsset) -> Result<()> {
        if !self.kresko_assets.contains_key(&asset.address) {
            return Err(KreskoError::AssetNotFound(asset.address));
        }
        asset.validate()?;
        info!(asset = %asset.address, symbol = %asset.symbol, exists = asset.exists, "Updated kresko asset");
        self.kresko_assets.insert(asset.address, asset);
        Ok(())
    }

    /// Get collateral asset by token address.
    pub fn collateral(&self, asset: &Address) -> Result<&CollateralAsset> {
        self.collaterals
            .get(asset)
            .ok_or(KreskoError::AssetNotFound(*asset))
    }

    /// Get Kresko asset by token address.
    pub fn kresko_asset(&self, asset: &Address) -> Result<&KrAsset> {
        self.kresko_assets
            .get(asset)
            .ok_or(KreskoError::AssetNotFound(*asset))
    }

    /// Get collateral asset by symbol.
    pub fn collateral_by_symbol(&self, symbol: &str) -> Option<&CollateralAsset> {
        self.collaterals.values().find(|a| a.symbol == symbol)
    }

    /// Get Kresko asset by symbol.
    pub fn kresko_asset_by_symbol(&self, symbol: &str) -> Option<&KrAsset> {
        self.kresko_assets.values().find(|a| a.symbol == symbol)
    }

    /// Active rebase of an asset (identity if it never rebased).
    pub fn rebase_of(&self, asset: &Address) -> Rebase {
        self.rebases.get(asset).copied().unwrap_or_default()
    }

    pub(crate) fn set_rebase(&mut self, asset: Address, rebase: Rebase) {
        self.rebases.insert(asset, rebase);
    }

    /// All collateral assets.
    pub fn collaterals(&self) -> impl Iterator<Item = &CollateralAsset> {
        self.collaterals.values()
    }

    /// All Kresko assets.
    pub fn kresko_assets(&self) -> impl Iterator<Item = &KrAsset> {
        self.kresko_assets.values()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn collateral(byte: u8, symbol: &str, factor_pct: u64) -> CollateralAsset {
        CollateralAsset {
            address: Address::repeat_byte(byte),
            symbol: symbol.to_string(),
            decimals: 18,
            factor: ONE_PERCENT * U256::from(factor_pct),
            oracle: Address::repeat_byte(byte.wrapping_add(0x80)),
            anchor: None,
            liquidation_incentive: ONE_PERCENT * U256::from(110u64),
            exists: true,
        }
    }

    pub fn kresko_asset(byte: u8, symbol: &str, k_factor_pct: u64) -> KrAsset {
        KrAsset {
            address: Address::repeat_byte(byte),
            symbol: symbol.to_string(),
            decimals: 18,
            k_factor: ONE_PERCENT * U256::from(k_factor_pct),
            oracle: Address::repeat_byte(byte.wrapping_add(0x80)),
            anchor: None,
            supply_limit: U256::from(1_000_000u64) * WAD,
            open_fee: U256::ZERO,
            close_fee: U256::ZERO,
            exists: true,
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = AssetRegistry::new();
        registry.add_collateral_asset(collateral(1, "USDC", 80)).unwrap();
        registry.add_kresko_asset(kresko_asset(2, "krETH", 120)).unwrap();

        let usdc = registry.collateral(&Address::repeat_byte(1)).unwrap();
        assert_eq!(usdc.symbol, "USDC");
        assert_eq!(registry.kresko_asset_by_symbol("krETH").unwrap().address, Address::repeat_byte(2));

        assert_eq!(
            registry.kresko_asset(&Address::repeat_byte(1)),
            Err(KreskoError::AssetNotFound(Address::repeat_byte(1)))
        );
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        let mut registry = AssetRegistry::new();
        registry.add_collateral_asset(collateral(1, "USDC", 80)).unwrap();
        assert_eq!(
            registry.add_collateral_asset(collateral(1, "USDC", 80)),
            Err(KreskoError::AssetExists(Address::repeat_byte(1)))
        );
    }

    #[test]
    fn test_factor_bounds() {
        let mut registry = AssetRegistry::new();
        assert!(matches!(
            registry.add_collateral_asset(collateral(1, "BAD", 101)),
            Err(KreskoError::InvalidParameter(_))
        ));
        assert!(matches!(
            registry.add_kresko_asset(kresko_asset(2, "krBAD", 99)),
            Err(KreskoError::InvalidParameter(_))
        ));

        let mut greedy = collateral(3, "GREEDY", 50);
        greedy.liquidation_incentive = ONE_PERCENT * U256::from(130u64);
        assert!(registry.add_collateral_asset(greedy).is_err());

        let mut pricey = kresko_asset(4, "krFEE", 100);
        pricey.open_fee = ONE_PERCENT * U256::from(11u64);
        assert!(registry.add_kresko_asset(pricey).is_err());
    }

    #[test]
    fn test_update_disables_asset() {
        let mut registry = AssetRegistry::new();
        let mut usdc = collateral(1, "USDC", 80);
        registry.add_collateral_asset(usdc.clone()).unwrap();

        usdc.exists = false;
        registry.update_collateral_asset(usdc).unwrap();
        assert!(!registry.collateral(&Address::repeat_byte(1)).unwrap().exists);

        assert!(registry.update_kresko_asset(kresko_asset(9, "krX", 100)).is_err());
    }

    #[test]
    fn test_rebase_defaults_to_identity() {
        let mut registry = AssetRegistry::new();
        let asset = Address::repeat_byte(7);
        assert!(registry.rebase_of(&asset).is_identity());

        registry.set_rebase(asset, Rebase::split(4).unwrap());
        assert_eq!(registry.rebase_of(&asset), Rebase::split(4).unwrap());
    }
}
