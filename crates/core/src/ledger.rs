//! Per-account position bookkeeping.
//!
//! An account keeps two ordered asset lists (deposited collateral and minted
//! Kresko assets) plus an amount map per side. All amounts are anchor units.
//! Removing a position swaps the last list element into its slot, so the
//! index of the moved asset changes and callers must look it up again.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

use crate::error::{KreskoError, Result};
use crate::math::{mul_div, Rounding};

/// Inline capacity of the per-account asset lists.
pub type AssetList = SmallVec<[Address; 8]>;

/// Debt held in one Kresko asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DebtPosition {
    /// Anchor units, principal plus capitalized interest
    pub amount: U256,
    /// Debt index the amount was last scaled to (RAY)
    pub last_debt_index: U256,
    /// Capitalized interest not yet repaid (anchor units)
    pub interest: U256,
}

impl DebtPosition {
    /// Scale the position to `index`. Returns the interest added.
    pub fn accrue_to(&mut self, index: U256) -> Result<U256> {
        if self.last_debt_index.is_zero() {
            self.last_debt_index = index;
            return Ok(U256::ZERO);
        }
        if index <= self.last_debt_index {
            return Ok(U256::ZERO);
        }
        let scaled = mul_div(self.amount, index, self.last_debt_index, Rounding::Up)?;
        let added = scaled - self.amount;
        self.amount = scaled;
        self.interest = self.interest.checked_add(added).ok_or(KreskoError::MathOverflow)?;
        self.last_debt_index = index;
        Ok(added)
    }
}

/// Collateral and debt positions of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    deposited_collateral_assets: AssetList,
    minted_kresko_assets: AssetList,
    collateral_deposits: HashMap<Address, U256>,
    debts: HashMap<Address, DebtPosition>,
}

impl Account {
    pub fn is_empty(&self) -> bool {
        self.deposited_collateral_assets.is_empty() && self.minted_kresko_assets.is_empty()
    }

    pub fn deposited_collateral_assets(&self) -> &[Address] {
        &self.deposited_collateral_assets
    }

    pub fn minted_kresko_assets(&self) -> &[Address] {
        &self.minted_kresko_assets
    }

    pub fn collateral_index(&self, asset: &Address) -> Option<usize> {
        self.deposited_collateral_assets.iter().position(|a| a == asset)
    }

    pub fn debt_index_of(&self, asset: &Address) -> Option<usize> {
        self.minted_kresko_assets.iter().position(|a| a == asset)
    }

    /// Collateral deposit in anchor units (zero when absent).
    pub fn collateral_amount(&self, asset: &Address) -> U256 {
        self.collateral_deposits.get(asset).copied().unwrap_or_default()
    }

    /// Debt amount in anchor units (zero when absent).
    pub fn debt_amount(&self, asset: &Address) -> U256 {
        self.debts.get(asset).map(|d| d.amount).unwrap_or_default()
    }

    pub fn debt(&self, asset: &Address) -> Option<&DebtPosition> {
        self.debts.get(asset)
    }

    pub(crate) fn debt_mut(&mut self, asset: &Address) -> Option<&mut DebtPosition> {
        self.debts.get_mut(asset)
    }

    /// Collateral deposits in list order.
    pub fn deposits(&self) -> impl Iterator<Item = (Address, U256)> + '_ {
        self.deposited_collateral_assets
            .iter()
            .map(|a| (*a, self.collateral_amount(a)))
    }

    /// Debt positions in list order.
    pub fn debts(&self) -> impl Iterator<Item = (Address, &DebtPosition)> + '_ {
        self.minted_kresko_assets
            .iter()
            .filter_map(|a| self.debts.get(a).map(|d| (*a, d)))
    }

    /// Add to a collateral deposit, appending the asset on first use.
    pub fn add_collateral(&mut self, asset: Address, amount: U256, max_positions: usize) -> Result<U256> {
        if !self.collateral_deposits.contains_key(&asset) {
            if self.deposited_collateral_assets.len() >= max_positions {
                return Err(KreskoError::TooManyPositions { max: max_positions });
            }
            self.deposited_collateral_assets.push(asset);
        }
        let deposit = self.collateral_deposits.entry(asset).or_default();
        *deposit = deposit.checked_add(amount).ok_or(KreskoError::MathOverflow)?;
        Ok(*deposit)
    }

    /// Remove from a collateral deposit; drops the asset at zero.
    pub fn decrease_collateral(&mut self, asset: Address, amount: U256, expected_index: usize) -> Result<U256> {
        check_index(&self.deposited_collateral_assets, asset, expected_index)?;
        let available = self.collateral_amount(&asset);
        if amount > available {
            return Err(KreskoError::AmountExceedsPosition {
                asset,
                amount,
                available,
            });
        }

        let remaining = available - amount;
        if remaining.is_zero() {
            self.deposited_collateral_assets.swap_remove(expected_index);
            self.collateral_deposits.remove(&asset);
        } else {
            self.collateral_deposits.insert(asset, remaining);
        }
        Ok(remaining)
    }

    /// Add debt, opening the position at `debt_index` on first use.
    pub fn add_debt(
        &mut self,
        asset: Address,
        amount: U256,
        debt_index: U256,
        max_positions: usize,
    ) -> Result<U256> {
        if !self.debts.contains_key(&asset) {
            if self.minted_kresko_assets.len() >= max_positions {
                return Err(KreskoError::TooManyPositions { max: max_positions });
            }
            self.minted_kresko_assets.push(asset);
            self.debts.insert(
                asset,
                DebtPosition {
                    amount: U256::ZERO,
                    last_debt_index: debt_index,
                    interest: U256::ZERO,
                },
            );
        }
        let position = self
            .debts
            .get_mut(&asset)
            .ok_or(KreskoError::AssetNotFound(asset))?;
        position.amount = position.amount.checked_add(amount).ok_or(KreskoError::MathOverflow)?;
        Ok(position.amount)
    }

    /// Repay debt (interest first); drops the asset at zero.
    pub fn decrease_debt(&mut self, asset: Address, amount: U256, expected_index: usize) -> Result<U256> {
        check_index(&self.minted_kresko_assets, asset, expected_index)?;
        let position = self
            .debts
            .get_mut(&asset)
            .ok_or(KreskoError::AssetNotFound(asset))?;
        if amount > position.amount {
            return Err(KreskoError::AmountExceedsPosition {
                asset,
                amount,
                available: position.amount,
            });
        }

        position.amount -= amount;
        position.interest = position.interest.saturating_sub(amount);
        let remaining = position.amount;
        if remaining.is_zero() {
            self.minted_kresko_assets.swap_remove(expected_index);
            self.debts.remove(&asset);
        }
        Ok(remaining)
    }
}

/// Fail with `IndexOutOfBounds` unless `list[index] == asset`.
pub fn check_index(list: &[Address], asset: Address, index: usize) -> Result<()> {
    if list.get(index) != Some(&asset) {
        return Err(KreskoError::IndexOutOfBounds {
            asset,
            index,
            len: list.len(),
        });
    }
    Ok(())
}

/// Index of `asset` in `list`, or `IndexOutOfBounds` when absent.
pub fn resolve_index(list: &[Address], asset: Address) -> Result<usize> {
    list.iter()
        .position(|a| *a == asset)
        .ok_or(KreskoError::IndexOutOfBounds {
            asset,
            index: list.len(),
            len: list.len(),
        })
}

/// All accounts with at least one position.
#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    accounts: HashMap<Address, Account>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Working copy of an account (empty if unknown).
    pub fn load(&self, address: &Address) -> Account {
        self.accounts.get(address).cloned().unwrap_or_default()
    }

    /// Replace an account; empty accounts are dropped.
    pub fn store(&mut self, address: Address, account: Account) {
        if account.is_empty() {
            self.accounts.remove(&address);
        } else {
            self.accounts.insert(address, account);
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.accounts.keys()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::RAY;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_add_or_increase() {
        let mut account = Account::default();
        account.add_collateral(addr(1), U256::from(100u64), 8).unwrap();
        account.add_collateral(addr(2), U256::from(50u64), 8).unwrap();
        let total = account.add_collateral(addr(1), U256::from(25u64), 8).unwrap();

        assert_eq!(total, U256::from(125u64));
        assert_eq!(account.deposited_collateral_assets(), &[addr(1), addr(2)]);
    }

    #[test]
    fn test_position_limit() {
        let mut account = Account::default();
        account.add_collateral(addr(1), U256::from(1u64), 1).unwrap();
        assert_eq!(
            account.add_collateral(addr(2), U256::from(1u64), 1),
            Err(KreskoError::TooManyPositions { max: 1 })
        );
        // Increasing an existing position is always allowed
        assert!(account.add_collateral(addr(1), U256::from(1u64), 1).is_ok());
    }

    #[test]
    fn test_swap_and_pop_removal() {
        let mut account = Account::default();
        for byte in 1..=3 {
            account.add_collateral(addr(byte), U256::from(10u64), 8).unwrap();
        }

        let remaining = account.decrease_collateral(addr(1), U256::from(10u64), 0).unwrap();
        assert!(remaining.is_zero());
        // Last element moved into the freed slot
        assert_eq!(account.deposited_collateral_assets(), &[addr(3), addr(2)]);
        assert_eq!(account.collateral_index(&addr(3)), Some(0));
    }

    #[test]
    fn test_stale_index_rejected() {
        let mut account = Account::default();
        account.add_collateral(addr(1), U256::from(10u64), 8).unwrap();
        account.add_collateral(addr(2), U256::from(10u64), 8).unwrap();

        assert_eq!(
            account.decrease_collateral(addr(2), U256::from(1u64), 0),
            Err(KreskoError::IndexOutOfBounds {
                asset: addr(2),
                index: 0,
                len: 2
            })
        );
        assert!(matches!(
            account.decrease_collateral(addr(2), U256::from(1u64), 5),
            Err(KreskoError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_decrease_beyond_position() {
        let mut account = Account::default();
        account.add_collateral(addr(1), U256::from(10u64), 8).unwrap();
        assert!(matches!(
            account.decrease_collateral(addr(1), U256::from(11u64), 0),
            Err(KreskoError::AmountExceedsPosition { .. })
        ));
    }

    #[test]
    fn test_debt_accrual_and_repayment() {
        let mut account = Account::default();
        account.add_debt(addr(9), U256::from(1_000u64), RAY, 8).unwrap();

        let added = account
            .debt_mut(&addr(9))
            .unwrap()
            .accrue_to(RAY + RAY / U256::from(10u64))
            .unwrap();
        assert_eq!(added, U256::from(100u64));
        assert_eq!(account.debt_amount(&addr(9)), U256::from(1_100u64));

        // Repayment reduces interest first
        account.decrease_debt(addr(9), U256::from(60u64), 0).unwrap();
        let debt = account.debt(&addr(9)).unwrap();
        assert_eq!(debt.interest, U256::from(40u64));
        assert_eq!(debt.amount, U256::from(1_040u64));

        account.decrease_debt(addr(9), U256::from(1_040u64), 0).unwrap();
        assert!(account.minted_kresko_assets().is_empty());
        assert!(account.is_empty());
    }

    #[test]
    fn test_accrual_never_shrinks() {
        let mut position = DebtPosition {
            amount: U256::from(500u64),
            last_debt_index: RAY * U256::from(2u64),
            interest: U256::ZERO,
        };
        assert_eq!(position.accrue_to(RAY).unwrap(), U256::ZERO);
        assert_eq!(position.amount, U256::from(500u64));
    }

    #[test]
    fn test_ledger_drops_empty_accounts() {
        let mut ledger = AccountLedger::new();
        let mut account = ledger.load(&addr(1));
        account.add_collateral(addr(2), U256::from(5u64), 8).unwrap();
        ledger.store(addr(1), account);
        assert_eq!(ledger.len(), 1);

        let mut account = ledger.load(&addr(1));
        account.decrease_collateral(addr(2), U256::from(5u64), 0).unwrap();
        ledger.store(addr(1), account);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_resolve_index() {
        let list = [addr(1), addr(2)];
        assert_eq!(resolve_index(&list, addr(2)), Ok(1));
        assert!(resolve_index(&list, addr(3)).is_err());
    }
}
