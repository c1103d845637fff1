//! Asset configuration loading from TOML files.
//!
//! Addresses are hex strings and all ratios, prices and limits are decimal
//! strings ("0.8", "1.1", "2500.5") so no precision is lost to floats.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::math::{parse_units, PRICE_DECIMALS};
use crate::registry::{CollateralAsset, KrAsset};
use crate::stability::StabilityRateConfig;

/// Asset configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default)]
    pub collaterals: Vec<CollateralConfig>,
    #[serde(default)]
    pub kresko_assets: Vec<KrAssetConfig>,
}

/// Collateral asset entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Asset symbol (e.g., "USDC")
    pub symbol: String,
    /// Token address (hex)
    pub token: String,
    /// Oracle reference address (hex)
    pub oracle: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Collateral factor, e.g. "0.8"
    pub factor: String,
    /// Anchor token for rebasing collateral
    #[serde(default)]
    pub anchor: Option<String>,
    /// Liquidation incentive multiplier, e.g. "1.1"
    #[serde(default = "default_incentive")]
    pub liquidation_incentive: String,
    /// Initial USD price for simulations
    #[serde(default)]
    pub price: Option<String>,
    /// Whether deposits are accepted
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Kresko asset entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KrAssetConfig {
    /// Asset symbol (e.g., "krETH")
    pub symbol: String,
    pub token: String,
    pub oracle: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// k-factor, e.g. "1.2"
    pub k_factor: String,
    #[serde(default)]
    pub anchor: Option<String>,
    /// Maximum total supply in whole tokens
    pub supply_limit: String,
    #[serde(default = "default_fee")]
    pub open_fee: String,
    #[serde(default = "default_fee")]
    pub close_fee: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Stability rate curve; no interest accrues without one
    #[serde(default)]
    pub stability: Option<StabilityConfig>,
}

/// Stability rate curve as decimal annual ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_base_rate")]
    pub base_rate: String,
    #[serde(default = "default_slope1")]
    pub rate_slope1: String,
    #[serde(default = "default_slope2")]
    pub rate_slope2: String,
    #[serde(default = "default_optimal")]
    pub optimal_price_rate: String,
    #[serde(default = "default_delta")]
    pub price_rate_delta: String,
}

fn default_decimals() -> u8 {
    18
}
fn default_incentive() -> String {
    "1.1".to_string()
}
fn default_fee() -> String {
    "0".to_string()
}
fn default_true() -> bool {
    true
}
fn default_base_rate() -> String {
    "0.005".to_string()
}
fn default_slope1() -> String {
    "0.1".to_string()
}
fn default_slope2() -> String {
    "5".to_string()
}
fn default_optimal() -> String {
    "1".to_string()
}
fn default_delta() -> String {
    "0.025".to_string()
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            base_rate: default_base_rate(),
            rate_slope1: default_slope1(),
            rate_slope2: default_slope2(),
            optimal_price_rate: default_optimal(),
            price_rate_delta: default_delta(),
        }
    }
}

impl AssetsConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read assets config {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse assets config {:?}", path))
    }

    /// Collateral entry by symbol.
    pub fn collateral(&self, symbol: &str) -> Option<&CollateralConfig> {
        self.collaterals.iter().find(|c| c.symbol == symbol)
    }

    /// Kresko asset entry by symbol.
    pub fn kresko_asset(&self, symbol: &str) -> Option<&KrAssetConfig> {
        self.kresko_assets.iter().find(|k| k.symbol == symbol)
    }
}

impl CollateralConfig {
    pub fn to_asset(&self) -> Result<CollateralAsset> {
        Ok(CollateralAsset {
            address: parse_address("token", &self.token)?,
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            factor: parse_ratio(&self.symbol, "factor", &self.factor)?,
            oracle: parse_address("oracle", &self.oracle)?,
            anchor: self.anchor.as_deref().map(|a| parse_address("anchor", a)).transpose()?,
            liquidation_incentive: parse_ratio(
                &self.symbol,
                "liquidation_incentive",
                &self.liquidation_incentive,
            )?,
            exists: self.active,
        })
    }

    /// Initial price (8 decimals), if configured.
    pub fn price(&self) -> Result<Option<U256>> {
        parse_price(&self.symbol, self.price.as_deref())
    }
}

impl KrAssetConfig {
    pub fn to_asset(&self) -> Result<KrAsset> {
        Ok(KrAsset {
            address: parse_address("token", &self.token)?,
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            k_factor: parse_ratio(&self.symbol, "k_factor", &self.k_factor)?,
            oracle: parse_address("oracle", &self.oracle)?,
            anchor: self.anchor.as_deref().map(|a| parse_address("anchor", a)).transpose()?,
            supply_limit: parse_units(&self.supply_limit, self.decimals).ok_or_else(|| {
                anyhow!("{}: invalid supply_limit '{}'", self.symbol, self.supply_limit)
            })?,
            open_fee: parse_ratio(&self.symbol, "open_fee", &self.open_fee)?,
            close_fee: parse_ratio(&self.symbol, "close_fee", &self.close_fee)?,
            exists: self.active,
        })
    }

    /// Initial price (8 decimals), if configured.
    pub fn price(&self) -> Result<Option<U256>> {
        parse_price(&self.symbol, self.price.as_deref())
    }

    /// Resolved stability curve, if configured.
    pub fn stability_rate(&self) -> Result<Option<StabilityRateConfig>> {
        self.stability.as_ref().map(|s| s.resolve(&self.symbol)).transpose()
    }
}

impl StabilityConfig {
    pub fn resolve(&self, symbol: &str) -> Result<StabilityRateConfig> {
        Ok(StabilityRateConfig {
            stability_rate_base: parse_ray(symbol, "base_rate", &self.base_rate)?,
            rate_slope1: parse_ray(symbol, "rate_slope1", &self.rate_slope1)?,
            rate_slope2: parse_ray(symbol, "rate_slope2", &self.rate_slope2)?,
            optimal_price_rate: parse_ray(symbol, "optimal_price_rate", &self.optimal_price_rate)?,
            price_rate_delta: parse_ray(symbol, "price_rate_delta", &self.price_rate_delta)?,
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| anyhow!("Invalid {} address '{}': {}", field, value, e))
}

fn parse_ratio(symbol: &str, field: &str, value: &str) -> Result<U256> {
    parse_units(value, 18).ok_or_else(|| anyhow!("{}: invalid {} '{}'", symbol, field, value))
}

fn parse_ray(symbol: &str, field: &str, value: &str) -> Result<U256> {
    parse_units(value, 27).ok_or_else(|| anyhow!("{}: invalid {} '{}'", symbol, field, value))
}

fn parse_price(symbol: &str, value: Option<&str>) -> Result<Option<U256>> {
    value
        .map(|v| {
            parse_units(v, PRICE_DECIMALS).ok_or_else(|| anyhow!("{}: invalid price '{}'", symbol, v))
        })
        .transpose()
}
