//! Read-only queries.
//!
//! Views never mutate state. Debt is projected to the current time with the
//! stored stability rates, so they agree with what the next operation sees.

use alloy::primitives::{Address, U256};
use serde::Serialize;

use super::Kresko;
use crate::error::{KreskoError, Result};
use crate::ledger::Account;
use crate::liquidation::{self, LiquidationCandidate};
use crate::math::{ratio_wad, Rounding};
use kresko_chain::TokenCustody;

/// One collateral deposit in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositSnapshot {
    pub asset: Address,
    pub symbol: String,
    /// External units
    pub amount: U256,
    /// USD value with the cFactor applied
    pub value: U256,
}

/// One debt position in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtSnapshot {
    pub asset: Address,
    pub symbol: String,
    /// External units, interest included
    pub amount: U256,
    /// Accrued interest still owed, external units
    pub interest: U256,
    /// USD value with the k-factor applied
    pub value: U256,
}

/// Full valuation of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub account: Address,
    pub collateral_value: U256,
    pub debt_value: U256,
    pub min_collateral_value: U256,
    /// Collateral value over debt value; `None` without debt
    pub collateral_ratio: Option<U256>,
    pub liquidatable: bool,
    pub deposits: Vec<DepositSnapshot>,
    pub debts: Vec<DebtSnapshot>,
}

impl<C: TokenCustody> Kresko<C> {
    /// Account with every debt position accrued to now.
    fn projected_account(&self, account: &Address) -> Result<Account> {
        let mut state = self.ledger.load(account);
        let now = self.clock.now();
        let minted: Vec<Address> = state.minted_kresko_assets().to_vec();
        for asset in minted {
            let index = self.rates.projected_index(&asset, now)?;
            if let Some(position) = state.debt_mut(&asset) {
                position.accrue_to(index)?;
            }
        }
        Ok(state)
    }

    /// Protocol collateral value (cFactor applied), USD WAD.
    pub fn get_account_collateral_value(&self, account: Address) -> Result<U256> {
        self.valuation()
            .account_collateral_value(&self.ledger.load(&account))
    }

    /// Protocol debt value (k-factor applied), USD WAD.
    pub fn get_account_kr_asset_value(&self, account: Address) -> Result<U256> {
        self.valuation()
            .account_debt_value(&self.projected_account(&account)?)
    }

    /// Collateral value needed to back the account's debt at `ratio` (WAD).
    pub fn get_account_min_collateral_at_ratio(&self, account: Address, ratio: U256) -> Result<U256> {
        self.valuation()
            .min_collateral_at_ratio(&self.projected_account(&account)?, ratio)
    }

    /// Collateral value over debt value (WAD); `U256::MAX` without debt.
    pub fn get_account_collateral_ratio(&self, account: Address) -> Result<U256> {
        let state = self.projected_account(&account)?;
        let valuation = self.valuation();
        ratio_wad(
            valuation.account_collateral_value(&state)?,
            valuation.account_debt_value(&state)?,
        )
    }

    pub fn is_account_liquidatable(&self, account: Address) -> Result<bool> {
        liquidation::is_liquidatable(&self.valuation(), &self.projected_account(&account)?)
    }

    /// Max repay value (USD WAD) for a pair; zero when the account is healthy.
    pub fn get_max_liquidation(&self, account: Address, repay_asset: Address, seize_asset: Address) -> Result<U256> {
        let repay = self.registry.kresko_asset(&repay_asset)?;
        let seize = self.registry.collateral(&seize_asset)?;
        let state = self.projected_account(&account)?;
        Ok(liquidation::max_liquidation(&self.valuation(), &state, repay, seize)?.unwrap_or_default())
    }

    /// Liquidatable pairs of an account, largest max value first.
    pub fn liquidation_candidates(&self, account: Address) -> Result<Vec<LiquidationCandidate>> {
        liquidation::candidates(&self.valuation(), &self.projected_account(&account)?)
    }

    /// Debt in external units, interest included.
    pub fn kresko_asset_debt(&self, account: Address, asset: Address) -> Result<U256> {
        let state = self.projected_account(&account)?;
        self.valuation().debt_external(&asset, state.debt_amount(&asset))
    }

    /// Accrued interest still owed: external amount and USD value.
    pub fn kresko_asset_debt_interest(&self, account: Address, asset: Address) -> Result<(U256, U256)> {
        let kr_asset = self.registry.kresko_asset(&asset)?;
        let state = self.projected_account(&account)?;
        let interest = state.debt(&asset).map(|d| d.interest).unwrap_or_default();
        let valuation = self.valuation();
        let amount = valuation.debt_external(&asset, interest)?;
        let value = valuation.value_of(kr_asset, amount, true, Rounding::Up)?;
        Ok((amount, value))
    }

    /// Collateral deposit in external units.
    pub fn collateral_deposits(&self, account: Address, asset: Address) -> Result<U256> {
        let anchor = self
            .ledger
            .account(&account)
            .map(|a| a.collateral_amount(&asset))
            .unwrap_or_default();
        self.valuation().collateral_external(&asset, anchor)
    }

    pub fn deposited_collateral_assets(&self, account: Address) -> Vec<Address> {
        self.ledger
            .account(&account)
            .map(|a| a.deposited_collateral_assets().to_vec())
            .unwrap_or_default()
    }

    pub fn minted_kresko_assets(&self, account: Address) -> Vec<Address> {
        self.ledger
            .account(&account)
            .map(|a| a.minted_kresko_assets().to_vec())
            .unwrap_or_default()
    }

    pub fn deposited_collateral_asset_index(&self, account: Address, asset: Address) -> Option<usize> {
        self.ledger.account(&account)?.collateral_index(&asset)
    }

    pub fn minted_kresko_asset_index(&self, account: Address, asset: Address) -> Option<usize> {
        self.ledger.account(&account)?.debt_index_of(&asset)
    }

    /// Valuation of every position of an account.
    pub fn account_snapshot(&self, account: Address) -> Result<AccountSnapshot> {
        let state = self.projected_account(&account)?;
        let valuation = self.valuation();

        let deposits = state
            .deposits()
            .map(|(asset, anchor)| {
                let collateral = self.registry.collateral(&asset)?;
                Ok(DepositSnapshot {
                    asset,
                    symbol: collateral.symbol.clone(),
                    amount: valuation.collateral_external(&asset, anchor)?,
                    value: valuation.collateral_value(collateral, anchor, false)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let debts = state
            .debts()
            .map(|(asset, position)| {
                let kr_asset = self.registry.kresko_asset(&asset)?;
                Ok(DebtSnapshot {
                    asset,
                    symbol: kr_asset.symbol.clone(),
                    amount: valuation.debt_external(&asset, position.amount)?,
                    interest: valuation.debt_external(&asset, position.interest)?,
                    value: valuation.debt_value(kr_asset, position.amount, false)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let collateral_value = deposits.iter().try_fold(U256::ZERO, |total, d| {
            total.checked_add(d.value).ok_or(KreskoError::MathOverflow)
        })?;
        let debt_value = valuation.account_debt_value(&state)?;
        let min_collateral_value =
            valuation.min_collateral_at_ratio(&state, self.params.minimum_collateralization_ratio)?;

        Ok(AccountSnapshot {
            account,
            collateral_value,
            debt_value,
            min_collateral_value,
            collateral_ratio: (!debt_value.is_zero())
                .then(|| ratio_wad(collateral_value, debt_value))
                .transpose()?,
            liquidatable: liquidation::is_liquidatable(&valuation, &state)?,
            deposits,
            debts,
        })
    }
}
