//! Deployment loader that ties parameters and assets together.
//!
//! A deployment file holds a `[parameters]` table (optional; falls back to
//! the `KRESKO_PROFILE` profile) and an `[assets]` table in the
//! [`AssetsConfig`] layout.

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{AssetsConfig, Parameters, ParametersConfig};
use crate::engine::Kresko;
use crate::registry::{CollateralAsset, KrAsset};
use crate::stability::StabilityRateConfig;
use kresko_chain::TokenCustody;

/// Default deployment path when `KRESKO_CONFIG` is unset.
pub const DEFAULT_DEPLOYMENT_PATH: &str = "config/deployment.toml";

/// Deployment file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub parameters: Option<ParametersConfig>,
    #[serde(default)]
    pub assets: AssetsConfig,
}

fn default_name() -> String {
    "local".to_string()
}

/// Fully resolved deployment.
#[derive(Debug, Clone)]
pub struct ResolvedDeployment {
    pub name: String,
    pub parameters: Parameters,
    pub collaterals: Vec<CollateralAsset>,
    pub kresko_assets: Vec<KrAsset>,
    /// Stability curves by Kresko asset address
    pub stability_rates: Vec<(Address, StabilityRateConfig)>,
    /// Initial prices (8 decimals) by oracle address
    pub prices: Vec<(Address, U256)>,
}

impl DeploymentConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse deployment {:?}", path))
    }

    pub fn resolve(&self) -> Result<ResolvedDeployment> {
        let parameters_config = self.parameters.clone().unwrap_or_else(ParametersConfig::from_env);
        parameters_config.log_config();
        let parameters = parameters_config.resolve()?;

        let mut prices = Vec::new();
        let mut collaterals = Vec::with_capacity(self.assets.collaterals.len());
        for entry in &self.assets.collaterals {
            let asset = entry
                .to_asset()
                .with_context(|| format!("Invalid collateral '{}'", entry.symbol))?;
            if let Some(price) = entry.price()? {
                prices.push((asset.oracle, price));
            }
            collaterals.push(asset);
        }

        let mut kresko_assets = Vec::with_capacity(self.assets.kresko_assets.len());
        let mut stability_rates = Vec::new();
        for entry in &self.assets.kresko_assets {
            let asset = entry
                .to_asset()
                .with_context(|| format!("Invalid kresko asset '{}'", entry.symbol))?;
            if let Some(price) = entry.price()? {
                prices.push((asset.oracle, price));
            }
            if let Some(config) = entry.stability_rate()? {
                stability_rates.push((asset.address, config));
            }
            kresko_assets.push(asset);
        }

        info!(
            deployment = %self.name,
            collaterals = collaterals.len(),
            kresko_assets = kresko_assets.len(),
            "Resolved deployment"
        );

        Ok(ResolvedDeployment {
            name: self.name.clone(),
            parameters,
            collaterals,
            kresko_assets,
            stability_rates,
            prices,
        })
    }
}

impl ResolvedDeployment {
    /// Register every asset and stability rate with an engine.
    pub fn apply<C: TokenCustody>(&self, engine: &mut Kresko<C>) -> crate::Result<()> {
        engine.update_parameters(self.parameters.clone())?;
        for asset in &self.collaterals {
            engine.add_collateral_asset(asset.clone())?;
        }
        for asset in &self.kresko_assets {
            engine.add_kresko_asset(asset.clone())?;
        }
        for (asset, config) in &self.stability_rates {
            engine.init_stability_rate(*asset, *config)?;
        }
        Ok(())
    }
}

/// Load and resolve a deployment file.
pub fn load_deployment(path: impl AsRef<Path>) -> Result<ResolvedDeployment> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading deployment configuration");
    DeploymentConfig::from_file(path)?.resolve()
}

/// Load the deployment named by `KRESKO_CONFIG`, or the default path.
pub fn load_deployment_from_env() -> Result<ResolvedDeployment> {
    let path = std::env::var("KRESKO_CONFIG").unwrap_or_else(|_| DEFAULT_DEPLOYMENT_PATH.to_string());
    load_deployment(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ONE_PERCENT;

    #[test]
    fn test_resolve_inline_deployment() {
        let config: DeploymentConfig = toml::from_str(
            r#"
            name = "test"

            [parameters]
            profile = "testing"
            oracle_staleness_secs = 0

            [[assets.collaterals]]
            symbol = "USDC"
            token = "0x1111111111111111111111111111111111111111"
            oracle = "0xa111111111111111111111111111111111111111"
            factor = "1"
            price = "1"

            [[assets.kresko_assets]]
            symbol = "krTSLA"
            token = "0x2222222222222222222222222222222222222222"
            oracle = "0xa222222222222222222222222222222222222222"
            k_factor = "1.1"
            supply_limit = "100000"

            [assets.kresko_assets.stability]
            "#,
        )
        .unwrap();

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.name, "test");
        assert_eq!(resolved.parameters.oracle_staleness_secs, 0);
        assert_eq!(resolved.collaterals[0].factor, ONE_PERCENT * U256::from(100u64));
        assert_eq!(resolved.kresko_assets[0].k_factor, ONE_PERCENT * U256::from(110u64));
        assert_eq!(resolved.prices.len(), 1);
        assert_eq!(resolved.stability_rates.len(), 1);
        assert_eq!(resolved.stability_rates[0].1, StabilityRateConfig::default());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_deployment("does/not/exist.toml").is_err());
    }
}
