//! The Kresko engine facade.
//!
//! [`Kresko`] owns protocol state and its collaborators. Every mutating
//! operation runs through [`Kresko::execute`]: a [`Tx`] works on copies,
//! the queued custody ops settle as one batch, and only then are the account,
//! stability rates and events committed. Operations take `&mut self`, so the
//! engine cannot be re-entered while one is in flight.

mod tx;
mod views;

pub(crate) use tx::Tx;
pub use views::{AccountSnapshot, DebtSnapshot, DepositSnapshot};

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::collateral;
use crate::config::Parameters;
use crate::error::{KreskoError, Result};
use crate::events::Event;
use crate::ledger::{resolve_index, AccountLedger};
use crate::liquidation::{self, LiquidationCall, LiquidationOutcome};
use crate::minting;
use crate::registry::{AssetRegistry, CollateralAsset, KrAsset};
use crate::stability::{StabilityRate, StabilityRateConfig, StabilityRates};
use crate::valuation::Valuation;
use kresko_chain::{Clock, PriceOracle, Rebase, TokenCustody, TokenVault};

/// Default holder of deposited collateral.
pub const DEFAULT_PROTOCOL_ACCOUNT: Address = Address::new([0xc0; 20]);

/// CDP engine over an oracle, a clock and a token custody.
#[derive(Debug)]
pub struct Kresko<C: TokenCustody = TokenVault> {
    params: Parameters,
    registry: AssetRegistry,
    ledger: AccountLedger,
    rates: StabilityRates,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    custody: C,
    protocol: Address,
    events: Vec<Event>,
}

impl<C: TokenCustody> Kresko<C> {
    /// Create an engine with no assets.
    pub fn new(
        params: Parameters,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        custody: C,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            registry: AssetRegistry::new(),
            ledger: AccountLedger::new(),
            rates: StabilityRates::new(),
            oracle,
            clock,
            custody,
            protocol: DEFAULT_PROTOCOL_ACCOUNT,
            events: Vec::new(),
        })
    }

    /// Hold deposited collateral under a different address.
    pub fn with_protocol_account(mut self, protocol: Address) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    pub fn rates(&self) -> &StabilityRates {
        &self.rates
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    /// Direct custody access (funding wallets in simulations).
    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn protocol_account(&self) -> Address {
        self.protocol
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Events committed so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take all committed events.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn valuation(&self) -> Valuation<'_> {
        Valuation::new(&self.registry, self.oracle.as_ref(), &self.params, self.clock.now())
    }

    /// Run `op` against a working copy of `account` and commit on success.
    fn execute<T>(
        &mut self,
        account: Address,
        op: impl FnOnce(&mut Tx<'_>) -> Result<T>,
    ) -> Result<T> {
        let (value, effects) = {
            let mut tx = Tx::begin(
                account,
                self.ledger.load(&account),
                self.rates.clone(),
                self.valuation(),
                &self.custody,
                self.protocol,
            )?;
            let value = op(&mut tx)?;
            (value, tx.finish())
        };

        self.custody.settle(&effects.ops)?;
        self.ledger.store(account, effects.account);
        self.rates = effects.rates;
        self.events.extend(effects.events);
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Account operations
    // ------------------------------------------------------------------

    #[instrument(skip(self), fields(account = %account, asset = %asset))]
    pub fn deposit_collateral(&mut self, account: Address, asset: Address, amount: U256) -> Result<()> {
        self.execute(account, |tx| collateral::deposit(tx, asset, amount))
    }

    /// Returns the amount paid out, which is the deposit when `amount` exceeds it.
    #[instrument(skip(self), fields(account = %account, asset = %asset))]
    pub fn withdraw_collateral(
        &mut self,
        account: Address,
        asset: Address,
        amount: U256,
        deposit_index: usize,
    ) -> Result<U256> {
        self.execute(account, |tx| collateral::withdraw(tx, asset, amount, deposit_index))
    }

    #[instrument(skip(self), fields(account = %account, asset = %asset))]
    pub fn mint_kresko_asset(&mut self, account: Address, asset: Address, amount: U256) -> Result<()> {
        self.execute(account, |tx| minting::mint(tx, asset, amount))
    }

    /// Returns the amount burned (the whole debt when dust would remain).
    #[instrument(skip(self), fields(account = %account, asset = %asset))]
    pub fn burn_kresko_asset(
        &mut self,
        account: Address,
        asset: Address,
        amount: U256,
        debt_index: usize,
    ) -> Result<U256> {
        self.execute(account, |tx| minting::burn(tx, asset, amount, debt_index))
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self), fields(account = %account, liquidator = %liquidator))]
    pub fn liquidate(
        &mut self,
        liquidator: Address,
        account: Address,
        repay_asset: Address,
        repay_amount: U256,
        seize_asset: Address,
        repay_index: usize,
        seize_index: usize,
        allow_seize_underflow: bool,
    ) -> Result<LiquidationOutcome> {
        self.execute(account, |tx| {
            liquidation::liquidate(
                tx,
                liquidator,
                repay_asset,
                repay_amount,
                seize_asset,
                repay_index,
                seize_index,
                allow_seize_underflow,
            )
        })
    }

    /// Apply liquidation calls in order, each atomically.
    ///
    /// Position indices are looked up fresh before every call. Stops at the
    /// first call whose account is no longer liquidatable; any other error is
    /// returned with the earlier calls already committed.
    #[instrument(skip(self, calls), fields(liquidator = %liquidator, calls = calls.len()))]
    pub fn batch_liquidate(
        &mut self,
        liquidator: Address,
        calls: &[LiquidationCall],
    ) -> Result<Vec<LiquidationOutcome>> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            let state = self.ledger.load(&call.account);
            let repay_index = resolve_index(state.minted_kresko_assets(), call.repay_asset)?;
            let seize_index = resolve_index(state.deposited_collateral_assets(), call.seize_asset)?;

            match self.liquidate(
                liquidator,
                call.account,
                call.repay_asset,
                call.repay_amount,
                call.seize_asset,
                repay_index,
                seize_index,
                call.allow_seize_underflow,
            ) {
                Ok(outcome) => outcomes.push(outcome),
                Err(KreskoError::NotLiquidatable) => {
                    info!(account = %call.account, executed = outcomes.len(), "Account restored, stopping batch");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    // ------------------------------------------------------------------
    // Admin operations
    // ------------------------------------------------------------------

    pub fn add_collateral_asset(&mut self, asset: CollateralAsset) -> Result<()> {
        liquidation::check_restorable(self.params.liquidation_threshold, &asset)?;
        let event = collateral_event(&asset);
        self.registry.add_collateral_asset(asset)?;
        self.events.push(event);
        Ok(())
    }

    pub fn update_collateral_asset(&mut self, asset: CollateralAsset) -> Result<()> {
        liquidation::check_restorable(self.params.liquidation_threshold, &asset)?;
        let event = collateral_event(&asset);
        self.registry.update_collateral_asset(asset)?;
        self.events.push(event);
        Ok(())
    }

    pub fn add_kresko_asset(&mut self, asset: KrAsset) -> Result<()> {
        let event = kresko_event(&asset);
        self.registry.add_kresko_asset(asset)?;
        self.events.push(event);
        Ok(())
    }

    pub fn update_kresko_asset(&mut self, asset: KrAsset) -> Result<()> {
        let event = kresko_event(&asset);
        self.registry.update_kresko_asset(asset)?;
        self.events.push(event);
        Ok(())
    }

    pub fn update_parameters(&mut self, params: Parameters) -> Result<()> {
        params.validate()?;
        for collateral in self.registry.collaterals() {
            liquidation::check_restorable(params.liquidation_threshold, collateral)?;
        }
        info!(
            mcr = %params.minimum_collateralization_ratio,
            liquidation_threshold = %params.liquidation_threshold,
            min_debt_value = %params.minimum_debt_value,
            "Updated parameters"
        );
        self.events.push(Event::ParametersUpdated {
            minimum_collateralization_ratio: params.minimum_collateralization_ratio,
            liquidation_threshold: params.liquidation_threshold,
            minimum_debt_value: params.minimum_debt_value,
        });
        self.params = params;
        Ok(())
    }

    /// Start accruing interest on a Kresko asset.
    pub fn init_stability_rate(&mut self, asset: Address, config: StabilityRateConfig) -> Result<()> {
        self.registry.kresko_asset(&asset)?;
        if self.rates.contains(&asset) {
            return Err(KreskoError::AssetExists(asset));
        }
        config.validate()?;
        let rate = StabilityRate::new(config, self.clock.now());
        info!(asset = %asset, rate = %rate.current_rate, "Initialized stability rate");
        self.events.push(Event::StabilityRateUpdated {
            asset,
            debt_index: rate.debt_index,
            rate: rate.current_rate,
        });
        self.rates.insert(asset, rate);
        Ok(())
    }

    /// Replace the curve of an initialized rate, accruing under the old one first.
    pub fn update_stability_rate(&mut self, asset: Address, config: StabilityRateConfig) -> Result<()> {
        let kr_asset = self.registry.kresko_asset(&asset)?;
        config.validate()?;
        let now = self.clock.now();
        let price_rate = self.valuation().price_rate(kr_asset);

        let rate = self
            .rates
            .get_mut(&asset)
            .ok_or(KreskoError::AssetNotFound(asset))?;
        let mut updated = *rate;
        updated.accrue(now, price_rate.unwrap_or(updated.config.optimal_price_rate))?;
        updated.config = config;
        updated.current_rate = config.rate_for(price_rate.unwrap_or(config.optimal_price_rate))?;
        *rate = updated;

        info!(asset = %asset, rate = %updated.current_rate, debt_index = %updated.debt_index, "Updated stability rate");
        self.events.push(Event::StabilityRateUpdated {
            asset,
            debt_index: updated.debt_index,
            rate: updated.current_rate,
        });
        Ok(())
    }

    /// Rebase a Kresko asset. `denominator` (WAD, >= 1.0) replaces the
    /// previous rebase; anchor-unit positions are untouched.
    #[instrument(skip(self, affected_pools), fields(asset = %asset))]
    pub fn rebase(
        &mut self,
        asset: Address,
        denominator: U256,
        positive: bool,
        affected_pools: &[Address],
    ) -> Result<()> {
        self.registry.kresko_asset(&asset)?;
        let rebase = Rebase::new(denominator, positive).map_err(|e| {
            warn!(error = %e, "Rejected rebase");
            KreskoError::from(e)
        })?;

        self.registry.set_rebase(asset, rebase);
        self.custody.set_rebase(asset, rebase);
        info!(
            positive,
            denominator = rebase.denominator_f64(),
            pools = affected_pools.len(),
            "Asset rebased"
        );
        self.events.push(Event::Rebased {
            asset,
            positive,
            denominator,
            affected_pools: affected_pools.to_vec(),
        });
        Ok(())
    }
}

fn collateral_event(asset: &CollateralAsset) -> Event {
    Event::CollateralAssetUpdated {
        asset: asset.address,
        factor: asset.factor,
        liquidation_incentive: asset.liquidation_incentive,
        exists: asset.exists,
    }
}

fn kresko_event(asset: &KrAsset) -> Event {
    Event::KreskoAssetUpdated {
        asset: asset.address,
        k_factor: asset.k_factor,
        supply_limit: asset.supply_limit,
        exists: asset.exists,
    }
}
