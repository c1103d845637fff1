//! Working copy of engine state for one operation.
//!
//! A [`Tx`] owns a clone of the touched account and of the stability rates,
//! borrows everything else, and queues custody ops and events. Nothing is
//! visible outside until the engine commits the returned [`TxEffects`].

use alloy::primitives::{Address, U256};
use tracing::warn;

use crate::error::{KreskoError, Result};
use crate::events::Event;
use crate::ledger::{Account, AssetList};
use crate::stability::StabilityRates;
use crate::valuation::Valuation;
use kresko_chain::{TokenCustody, TokenOp};

pub(crate) struct Tx<'a> {
    /// Account the operation acts on
    pub account: Address,
    /// Working copy of that account
    pub state: Account,
    /// Working copy of all stability rates
    pub rates: StabilityRates,
    pub valuation: Valuation<'a>,
    /// Holder of deposited collateral
    pub protocol: Address,
    custody: &'a dyn TokenCustody,
    ops: Vec<TokenOp>,
    events: Vec<Event>,
}

/// Everything an operation wants to commit.
pub(crate) struct TxEffects {
    pub account: Account,
    pub rates: StabilityRates,
    pub ops: Vec<TokenOp>,
    pub events: Vec<Event>,
}

impl<'a> Tx<'a> {
    /// Open a transaction and accrue every debt position of the account.
    pub fn begin(
        account: Address,
        state: Account,
        rates: StabilityRates,
        valuation: Valuation<'a>,
        custody: &'a dyn TokenCustody,
        protocol: Address,
    ) -> Result<Self> {
        let mut tx = Self {
            account,
            state,
            rates,
            valuation,
            protocol,
            custody,
            ops: Vec::new(),
            events: Vec::new(),
        };
        let minted: AssetList = tx.state.minted_kresko_assets().iter().copied().collect();
        for asset in minted {
            tx.accrue(&asset)?;
        }
        Ok(tx)
    }

    /// Accrue the debt index of `asset` and the account's position in it.
    pub fn accrue(&mut self, asset: &Address) -> Result<U256> {
        let price_rate = self
            .valuation
            .registry
            .kresko_asset(asset)
            .ok()
            .and_then(|kr| self.valuation.price_rate(kr));
        let index = self.rates.accrue(asset, self.valuation.now, price_rate)?;
        if let Some(position) = self.state.debt_mut(asset) {
            position.accrue_to(index)?;
        }
        Ok(index)
    }

    /// Fail unless the account satisfies the minimum collateralization ratio.
    pub fn ensure_solvent(&self) -> Result<()> {
        if self.state.minted_kresko_assets().is_empty() {
            return Ok(());
        }
        let collateral_value = self.valuation.account_collateral_value(&self.state)?;
        let required = self.valuation.min_collateral_at_ratio(
            &self.state,
            self.valuation.params.minimum_collateralization_ratio,
        )?;
        if collateral_value < required {
            warn!(
                account = %self.account,
                collateral_value = %collateral_value,
                required = %required,
                "Insufficient collateral"
            );
            return Err(KreskoError::InsufficientCollateral {
                collateral_value,
                required,
            });
        }
        Ok(())
    }

    /// External total supply, before this transaction's own ops.
    pub fn total_supply(&self, asset: Address) -> U256 {
        self.custody.total_supply(asset)
    }

    pub fn queue(&mut self, op: TokenOp) {
        self.ops.push(op);
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn finish(self) -> TxEffects {
        TxEffects {
            account: self.state,
            rates: self.rates,
            ops: self.ops,
            events: self.events,
        }
    }
}
