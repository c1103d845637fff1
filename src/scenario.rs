//! Scripted simulations against an in-memory engine.
//!
//! A scenario file names a deployment and lists steps. Each step either
//! drives the environment (prices, time, wallet funding) or calls one engine
//! operation. Engine reverts are recorded in the report and the run goes on;
//! malformed steps abort it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::primitives::{keccak256, Address, U256};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use kresko_chain::{
    Clock, InMemoryOracle, ManualClock, TokenCustody, TokenVault, PRICE_DECIMALS,
};
use kresko_core::math::parse_units;
use kresko_core::{
    AccountSnapshot, Event, Kresko, KreskoError, LiquidationCall, PricedAsset, ResolvedDeployment,
};

/// Default scenario path when none is given on the command line.
pub const DEFAULT_SCENARIO_PATH: &str = "config/scenario.toml";

/// Scenario file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_name")]
    pub name: String,
    /// Deployment file; `KRESKO_CONFIG` or the default path when unset
    #[serde(default)]
    pub deployment: Option<PathBuf>,
    /// Unix timestamp the simulated clock starts at
    #[serde(default = "default_start_time")]
    pub start_time: u64,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_name() -> String {
    "scenario".to_string()
}

fn default_start_time() -> u64 {
    1_700_000_000
}

/// One scripted action.
///
/// Accounts are hex addresses or plain names (hashed into an address).
/// Assets are symbols from the deployment. Amounts and prices are decimal
/// strings; `"max"` asks for the whole position where that makes sense.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Fund {
        account: String,
        asset: String,
        amount: String,
    },
    SetPrice {
        asset: String,
        price: String,
    },
    SetMarketPrice {
        asset: String,
        #[serde(default)]
        price: Option<String>,
    },
    SetMarketOpen {
        asset: String,
        open: bool,
    },
    Advance {
        secs: u64,
    },
    Deposit {
        account: String,
        asset: String,
        amount: String,
    },
    Withdraw {
        account: String,
        asset: String,
        amount: String,
    },
    Mint {
        account: String,
        asset: String,
        amount: String,
    },
    Burn {
        account: String,
        asset: String,
        amount: String,
    },
    Liquidate {
        liquidator: String,
        account: String,
        repay_asset: String,
        repay_amount: String,
        seize_asset: String,
        #[serde(default)]
        allow_seize_underflow: bool,
    },
    /// Liquidate the best pair of every listed account with the liquidator's wallet.
    LiquidateAll {
        liquidator: String,
        accounts: Vec<String>,
    },
    Rebase {
        asset: String,
        /// Decimal scale, e.g. "4" for a 4:1 split
        denominator: String,
        #[serde(default = "default_true")]
        positive: bool,
        #[serde(default)]
        pools: Vec<String>,
    },
    Snapshot {
        account: String,
    },
}

fn default_true() -> bool {
    true
}

impl Step {
    fn action(&self) -> &'static str {
        match self {
            Step::Fund { .. } => "fund",
            Step::SetPrice { .. } => "set_price",
            Step::SetMarketPrice { .. } => "set_market_price",
            Step::SetMarketOpen { .. } => "set_market_open",
            Step::Advance { .. } => "advance",
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::Mint { .. } => "mint",
            Step::Burn { .. } => "burn",
            Step::Liquidate { .. } => "liquidate",
            Step::LiquidateAll { .. } => "liquidate_all",
            Step::Rebase { .. } => "rebase",
            Step::Snapshot { .. } => "snapshot",
        }
    }
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse scenario {:?}", path))
    }
}

/// Result of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub output: Value,
}

/// Full run output.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub scenario: String,
    pub deployment: String,
    pub steps: Vec<StepReport>,
    pub events: Vec<Event>,
}

/// Asset as seen by the scenario: address plus what is needed to scale inputs.
#[derive(Debug, Clone, Copy)]
struct AssetRef {
    address: Address,
    oracle: Address,
    decimals: u8,
}

impl AssetRef {
    fn of<A: PricedAsset>(asset: &A) -> Self {
        Self {
            address: asset.address(),
            oracle: asset.oracle(),
            decimals: asset.decimals(),
        }
    }
}

/// Engine plus the simulated environment it runs in.
pub struct Simulation {
    engine: Kresko,
    oracle: Arc<InMemoryOracle>,
    clock: Arc<ManualClock>,
    deployment: String,
}

impl Simulation {
    pub fn new(deployment: &ResolvedDeployment, start_time: u64) -> Result<Self> {
        let oracle = Arc::new(InMemoryOracle::new());
        let clock = Arc::new(ManualClock::new(start_time));
        for (feed, price) in &deployment.prices {
            oracle.set_price(*feed, *price, start_time);
        }

        let mut engine = Kresko::new(
            deployment.parameters.clone(),
            oracle.clone(),
            clock.clone(),
            TokenVault::new(),
        )?;
        deployment.apply(&mut engine)?;
        engine.drain_events();

        info!(
            deployment = %deployment.name,
            collaterals = deployment.collaterals.len(),
            kresko_assets = deployment.kresko_assets.len(),
            start_time,
            "Simulation ready"
        );
        Ok(Self {
            engine,
            oracle,
            clock,
            deployment: deployment.name.clone(),
        })
    }

    /// Run every step in order.
    pub fn run(mut self, scenario: &Scenario) -> Result<Report> {
        let mut steps = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            let action = step.action();
            let report = match self.apply(step) {
                Ok(output) => {
                    debug!(index, action, "Step applied");
                    StepReport {
                        index,
                        action,
                        ok: true,
                        error: None,
                        output,
                    }
                }
                Err(e) => match e.downcast_ref::<KreskoError>() {
                    Some(revert) => {
                        warn!(index, action, error = %revert, "Step reverted");
                        StepReport {
                            index,
                            action,
                            ok: false,
                            error: Some(revert.to_string()),
                            output: Value::Null,
                        }
                    }
                    None => return Err(e.context(format!("Step {index} ({action}) failed"))),
                },
            };
            steps.push(report);
        }

        let reverted = steps.iter().filter(|s| !s.ok).count();
        info!(steps = steps.len(), reverted, "Scenario finished");
        Ok(Report {
            scenario: scenario.name.clone(),
            deployment: self.deployment,
            steps,
            events: self.engine.drain_events(),
        })
    }

    fn apply(&mut self, step: &Step) -> Result<Value> {
        match step {
            Step::Fund {
                account,
                asset,
                amount,
            } => {
                let asset = self.asset(asset)?;
                let amount = parse_amount(amount, asset.decimals)?;
                self.engine
                    .custody_mut()
                    .faucet(asset.address, account_address(account)?, amount)
                    .map_err(KreskoError::from)?;
                Ok(Value::Null)
            }
            Step::SetPrice { asset, price } => {
                let asset = self.asset(asset)?;
                self.oracle
                    .set_price(asset.oracle, parse_price(price)?, self.clock.now());
                Ok(Value::Null)
            }
            Step::SetMarketPrice { asset, price } => {
                let asset = self.asset(asset)?;
                let price = price.as_deref().map(parse_price).transpose()?;
                self.oracle.set_market_price(asset.oracle, price);
                Ok(Value::Null)
            }
            Step::SetMarketOpen { asset, open } => {
                let asset = self.asset(asset)?;
                self.oracle.set_market_open(asset.oracle, *open);
                Ok(Value::Null)
            }
            Step::Advance { secs } => {
                self.clock.advance(*secs);
                Ok(json!({ "now": self.engine.now() }))
            }
            Step::Deposit {
                account,
                asset,
                amount,
            } => {
                let asset = self.asset(asset)?;
                let amount = parse_amount(amount, asset.decimals)?;
                self.engine
                    .deposit_collateral(account_address(account)?, asset.address, amount)?;
                Ok(Value::Null)
            }
            Step::Withdraw {
                account,
                asset,
                amount,
            } => {
                let account = account_address(account)?;
                let asset = self.asset(asset)?;
                let amount = self.position_amount(amount, asset, |e, a| e.collateral_deposits(account, a))?;
                let index = self
                    .engine
                    .deposited_collateral_asset_index(account, asset.address)
                    .unwrap_or(usize::MAX);
                let paid = self
                    .engine
                    .withdraw_collateral(account, asset.address, amount, index)?;
                Ok(json!({ "withdrawn": paid }))
            }
            Step::Mint {
                account,
                asset,
                amount,
            } => {
                let asset = self.asset(asset)?;
                let amount = parse_amount(amount, asset.decimals)?;
                self.engine
                    .mint_kresko_asset(account_address(account)?, asset.address, amount)?;
                Ok(Value::Null)
            }
            Step::Burn {
                account,
                asset,
                amount,
            } => {
                let account = account_address(account)?;
                let asset = self.asset(asset)?;
                let amount = self.position_amount(amount, asset, |e, a| e.kresko_asset_debt(account, a))?;
                let index = self
                    .engine
                    .minted_kresko_asset_index(account, asset.address)
                    .unwrap_or(usize::MAX);
                let burned = self
                    .engine
                    .burn_kresko_asset(account, asset.address, amount, index)?;
                Ok(json!({ "burned": burned }))
            }
            Step::Liquidate {
                liquidator,
                account,
                repay_asset,
                repay_amount,
                seize_asset,
                allow_seize_underflow,
            } => {
                let account = account_address(account)?;
                let repay = self.asset(repay_asset)?;
                let seize = self.asset(seize_asset)?;
                let repay_amount = parse_amount(repay_amount, repay.decimals)?;
                let repay_index = self
                    .engine
                    .minted_kresko_asset_index(account, repay.address)
                    .unwrap_or(usize::MAX);
                let seize_index = self
                    .engine
                    .deposited_collateral_asset_index(account, seize.address)
                    .unwrap_or(usize::MAX);
                let outcome = self.engine.liquidate(
                    account_address(liquidator)?,
                    account,
                    repay.address,
                    repay_amount,
                    seize.address,
                    repay_index,
                    seize_index,
                    *allow_seize_underflow,
                )?;
                Ok(serde_json::to_value(outcome)?)
            }
            Step::LiquidateAll {
                liquidator,
                accounts,
            } => {
                let liquidator = account_address(liquidator)?;
                let mut calls = Vec::new();
                for account in accounts {
                    let account = account_address(account)?;
                    let Some(best) = self.engine.liquidation_candidates(account)?.into_iter().next() else {
                        continue;
                    };
                    let wallet = self.engine.custody().balance_of(best.repay_asset, liquidator);
                    if wallet.is_zero() {
                        warn!(account = %account, "Liquidator holds none of the repay asset");
                        continue;
                    }
                    calls.push(LiquidationCall {
                        account,
                        repay_asset: best.repay_asset,
                        repay_amount: wallet,
                        seize_asset: best.seize_asset,
                        // Sweeps take the whole deposit when rounding leaves it short
                        allow_seize_underflow: true,
                    });
                }
                let outcomes = self.engine.batch_liquidate(liquidator, &calls)?;
                Ok(json!({ "calls": calls.len(), "outcomes": outcomes }))
            }
            Step::Rebase {
                asset,
                denominator,
                positive,
                pools,
            } => {
                let asset = self.asset(asset)?;
                let denominator = parse_units(denominator, 18)
                    .ok_or_else(|| anyhow!("Invalid rebase denominator '{}'", denominator))?;
                let pools = pools
                    .iter()
                    .map(|p| account_address(p))
                    .collect::<Result<Vec<_>>>()?;
                self.engine
                    .rebase(asset.address, denominator, *positive, &pools)?;
                Ok(json!({ "scale": denominator.saturating_to::<u128>() as f64 / 1e18 }))
            }
            Step::Snapshot { account } => {
                let snapshot: AccountSnapshot =
                    self.engine.account_snapshot(account_address(account)?)?;
                Ok(serde_json::to_value(snapshot)?)
            }
        }
    }

    /// Resolve a symbol, preferring the Kresko asset when both tables list it.
    fn asset(&self, symbol: &str) -> Result<AssetRef> {
        let registry = self.engine.registry();
        registry
            .kresko_asset_by_symbol(symbol)
            .map(AssetRef::of)
            .or_else(|| registry.collateral_by_symbol(symbol).map(AssetRef::of))
            .ok_or_else(|| anyhow!("Unknown asset symbol '{}'", symbol))
    }

    /// Parse an amount, where `"max"` reads the current position.
    fn position_amount(
        &self,
        amount: &str,
        asset: AssetRef,
        position: impl Fn(&Kresko, Address) -> kresko_core::Result<U256>,
    ) -> Result<U256> {
        if amount.eq_ignore_ascii_case("max") {
            return Ok(position(&self.engine, asset.address)?);
        }
        parse_amount(amount, asset.decimals)
    }
}

/// Hex address, or a name hashed into one.
fn account_address(name: &str) -> Result<Address> {
    if name.starts_with("0x") {
        return name
            .parse()
            .map_err(|e| anyhow!("Invalid address '{}': {}", name, e));
    }
    Ok(Address::from_word(keccak256(name.as_bytes())))
}

fn parse_amount(value: &str, decimals: u8) -> Result<U256> {
    parse_units(value, decimals).ok_or_else(|| anyhow!("Invalid amount '{}'", value))
}

fn parse_price(value: &str) -> Result<U256> {
    parse_units(value, PRICE_DECIMALS).ok_or_else(|| anyhow!("Invalid price '{}'", value))
}
