//! Kresko core engine.
//!
//! This crate provides the CDP accounting and liquidation engine:
//! - Fixed-point math with explicit rounding
//! - Asset registry (collateral assets, Kresko assets, rebases)
//! - Position valuation against oracle prices and risk factors
//! - Account ledger with swap-and-pop position lists
//! - Deposit/withdraw, mint/burn and liquidation operations
//! - Stability rate (interest) accrual on debt
//!
//! Every mutating operation on [`Kresko`] is atomic: it either applies all
//! ledger, custody and event effects or none of them.

mod collateral;
pub mod config;
mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod liquidation;
pub mod math;
mod minting;
pub mod registry;
pub mod stability;
pub mod valuation;

pub use config::{
    load_deployment, load_deployment_from_env, AssetsConfig, DeploymentConfig, Parameters,
    ParametersConfig, ResolvedDeployment,
};
pub use engine::{AccountSnapshot, DebtSnapshot, DepositSnapshot, Kresko, DEFAULT_PROTOCOL_ACCOUNT};
pub use error::{KreskoError, Result};
pub use events::{Event, FeeKind};
pub use ledger::{Account, AccountLedger, DebtPosition};
pub use liquidation::{LiquidationCall, LiquidationCandidate, LiquidationOutcome};
pub use registry::{AssetRegistry, CollateralAsset, KrAsset, PricedAsset};
pub use stability::{StabilityRate, StabilityRateConfig, StabilityRates};
pub use valuation::Valuation;
