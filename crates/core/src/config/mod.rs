//! Configuration system for a Kresko deployment.
//!
//! This module provides:
//! - Global protocol parameters (profiles, TOML form, resolved form)
//! - Asset configuration (collaterals, Kresko assets, stability curves)
//! - Deployment loading (ties everything together)

mod asset_config;
mod loader;
mod params;

// Re-export parameters
pub use params::{Parameters, ParametersConfig, DEFAULT_FEE_RECIPIENT};

// Re-export asset config
pub use asset_config::{AssetsConfig, CollateralConfig, KrAssetConfig, StabilityConfig};

// Re-export deployment loader
pub use loader::{
    load_deployment, load_deployment_from_env, DeploymentConfig, ResolvedDeployment,
    DEFAULT_DEPLOYMENT_PATH,
};
