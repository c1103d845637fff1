//! Global protocol parameters with profile support.
//!
//! [`ParametersConfig`] is the TOML-facing form (decimal strings, hex
//! addresses). [`Parameters`] is the resolved fixed-point form the engine
//! runs on.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::error::{KreskoError, Result};
use crate::math::{parse_units, ONE_PERCENT, WAD};

/// Default collector of open/close fees.
pub const DEFAULT_FEE_RECIPIENT: Address = Address::new([0xfe; 20]);

/// Resolved global parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Minimum collateralization ratio for withdrawals and mints (WAD)
    pub minimum_collateralization_ratio: U256,
    /// Ratio below which an account is liquidatable (WAD)
    pub liquidation_threshold: U256,
    /// Minimum USD value of an open debt position (WAD)
    pub minimum_debt_value: U256,
    /// Smallest non-zero deposit of a rebasing collateral (anchor units)
    pub min_rebasing_collateral: U256,
    /// Receiver of open and close fees
    pub fee_recipient: Address,
    /// Oldest accepted oracle answer; 0 disables the check
    pub oracle_staleness_secs: u64,
    /// Maximum distinct assets per side of an account
    pub max_positions_per_account: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            minimum_collateralization_ratio: ONE_PERCENT * U256::from(150u64),
            liquidation_threshold: ONE_PERCENT * U256::from(140u64),
            minimum_debt_value: WAD * U256::from(10u64),
            min_rebasing_collateral: U256::from(1_000_000_000_000u64),
            fee_recipient: DEFAULT_FEE_RECIPIENT,
            oracle_staleness_secs: 3_600,
            max_positions_per_account: 32,
        }
    }
}

impl Parameters {
    pub fn validate(&self) -> Result<()> {
        if self.minimum_collateralization_ratio < WAD {
            return Err(KreskoError::InvalidParameter(
                "minimum collateralization ratio below 1.0".to_string(),
            ));
        }
        if self.liquidation_threshold < WAD
            || self.liquidation_threshold > self.minimum_collateralization_ratio
        {
            return Err(KreskoError::InvalidParameter(
                "liquidation threshold must be within 1.0..=MCR".to_string(),
            ));
        }
        if self.max_positions_per_account == 0 {
            return Err(KreskoError::InvalidParameter(
                "accounts need at least one position slot".to_string(),
            ));
        }
        if self.fee_recipient == Address::ZERO {
            return Err(KreskoError::InvalidParameter(
                "fee recipient is the zero address".to_string(),
            ));
        }
        Ok(())
    }
}

/// TOML-loadable parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// MCR as a decimal ratio (e.g. "1.5")
    #[serde(default = "default_mcr")]
    pub minimum_collateralization_ratio: String,

    /// Liquidation threshold as a decimal ratio
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold: String,

    /// Minimum debt value in USD
    #[serde(default = "default_min_debt_value")]
    pub minimum_debt_value: String,

    /// Rebasing collateral dust floor, raw anchor units
    #[serde(default = "default_min_rebasing_collateral")]
    pub min_rebasing_collateral: String,

    /// Fee recipient address (hex)
    #[serde(default = "default_fee_recipient")]
    pub fee_recipient: String,

    #[serde(default = "default_staleness")]
    pub oracle_staleness_secs: u64,

    #[serde(default = "default_max_positions")]
    pub max_positions_per_account: usize,
}

fn default_profile_name() -> String {
    "default".to_string()
}
fn default_mcr() -> String {
    "1.5".to_string()
}
fn default_liquidation_threshold() -> String {
    "1.4".to_string()
}
fn default_min_debt_value() -> String {
    "10".to_string()
}
fn default_min_rebasing_collateral() -> String {
    "1000000000000".to_string()
}
fn default_fee_recipient() -> String {
    DEFAULT_FEE_RECIPIENT.to_string()
}
fn default_staleness() -> u64 {
    3_600
}
fn default_max_positions() -> usize {
    32
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            minimum_collateralization_ratio: default_mcr(),
            liquidation_threshold: default_liquidation_threshold(),
            minimum_debt_value: default_min_debt_value(),
            min_rebasing_collateral: default_min_rebasing_collateral(),
            fee_recipient: default_fee_recipient(),
            oracle_staleness_secs: default_staleness(),
            max_positions_per_account: default_max_positions(),
        }
    }
}

impl ParametersConfig {
    /// Relaxed profile for tests and simulations: no staleness check, tiny floors.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            minimum_debt_value: "0.01".to_string(),
            min_rebasing_collateral: "1".to_string(),
            oracle_staleness_secs: 0,
            ..Self::default()
        }
    }

    /// Wider safety margins and a short staleness window.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            minimum_collateralization_ratio: "2.0".to_string(),
            liquidation_threshold: "1.7".to_string(),
            minimum_debt_value: "100".to_string(),
            oracle_staleness_secs: 300,
            max_positions_per_account: 16,
            ..Self::default()
        }
    }

    /// Get profile from environment variable KRESKO_PROFILE, or default.
    /// Supported values: testing, conservative
    pub fn from_env() -> Self {
        let profile = std::env::var("KRESKO_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "conservative" => Self::conservative(),
            _ => Self::default(),
        }
    }

    /// Resolve into engine parameters.
    pub fn resolve(&self) -> anyhow::Result<Parameters> {
        let params = Parameters {
            minimum_collateralization_ratio: parse_wad(
                "minimum_collateralization_ratio",
                &self.minimum_collateralization_ratio,
            )?,
            liquidation_threshold: parse_wad("liquidation_threshold", &self.liquidation_threshold)?,
            minimum_debt_value: parse_wad("minimum_debt_value", &self.minimum_debt_value)?,
            min_rebasing_collateral: parse_units(&self.min_rebasing_collateral, 0).ok_or_else(|| {
                anyhow!("Invalid min_rebasing_collateral '{}'", self.min_rebasing_collateral)
            })?,
            fee_recipient: self
                .fee_recipient
                .parse()
                .map_err(|e| anyhow!("Invalid fee recipient '{}': {}", self.fee_recipient, e))?,
            oracle_staleness_secs: self.oracle_staleness_secs,
            max_positions_per_account: self.max_positions_per_account,
        };
        params
            .validate()
            .with_context(|| format!("Invalid parameters in profile '{}'", self.profile))?;
        Ok(params)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Protocol parameters loaded");
        tracing::info!(
            mcr = %self.minimum_collateralization_ratio,
            liquidation_threshold = %self.liquidation_threshold,
            min_debt_value = %self.minimum_debt_value,
            "Solvency parameters"
        );
        tracing::info!(
            staleness_secs = self.oracle_staleness_secs,
            max_positions = self.max_positions_per_account,
            fee_recipient = %self.fee_recipient,
            "Operational parameters"
        );
    }
}

fn parse_wad(field: &str, value: &str) -> anyhow::Result<U256> {
    parse_units(value, 18).ok_or_else(|| anyhow!("Invalid {} '{}'", field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_resolves_to_default_parameters() {
        let params = ParametersConfig::default().resolve().unwrap();
        assert_eq!(params, Parameters::default());
    }

    #[test]
    fn test_testing_profile() {
        let params = ParametersConfig::testing().resolve().unwrap();
        assert_eq!(params.oracle_staleness_secs, 0);
        assert_eq!(params.minimum_debt_value, WAD / U256::from(100u64));
        assert_eq!(params.min_rebasing_collateral, U256::from(1u64));
    }

    #[test]
    fn test_conservative_profile() {
        let params = ParametersConfig::conservative().resolve().unwrap();
        assert_eq!(params.minimum_collateralization_ratio, WAD * U256::from(2u64));
        assert!(params.liquidation_threshold < params.minimum_collateralization_ratio);
    }

    #[test]
    fn test_threshold_above_mcr_rejected() {
        let config = ParametersConfig {
            liquidation_threshold: "1.6".to_string(),
            ..ParametersConfig::default()
        };
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ParametersConfig = toml::from_str(
            r#"
            profile = "custom"
            minimum_collateralization_ratio = "1.8"
            "#,
        )
        .unwrap();
        let params = config.resolve().unwrap();
        assert_eq!(params.minimum_collateralization_ratio, ONE_PERCENT * U256::from(180u64));
        assert_eq!(params.liquidation_threshold, ONE_PERCENT * U256::from(140u64));
    }

    #[test]
    fn test_serialization() {
        let config = ParametersConfig::testing();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"testing\""));

        let parsed: ParametersConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "testing");
    }
}
