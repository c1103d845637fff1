//! Token custody boundary.
//!
//! The engine never moves tokens directly. Each operation queues
//! [`TokenOp`]s and hands them to [`TokenCustody::settle`] as one batch;
//! a batch either applies completely or not at all.
//!
//! [`TokenVault`] is an in-memory custody that tracks balances the way a
//! rebasing token does: internally in anchor units, externally through the
//! asset's active [`Rebase`].

use crate::rebase::{Rebase, Rounding};
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Custody failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("insufficient {asset} balance for {holder}: have {available}, need {required}")]
    InsufficientBalance {
        asset: Address,
        holder: Address,
        available: U256,
        required: U256,
    },

    #[error("token amount overflow for {0}")]
    Overflow(Address),
}

/// A single token movement, expressed in external units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenOp {
    /// Move tokens between holders
    Transfer {
        asset: Address,
        from: Address,
        to: Address,
        amount: U256,
    },
    /// Create new supply
    Mint {
        asset: Address,
        to: Address,
        amount: U256,
    },
    /// Destroy supply
    Burn {
        asset: Address,
        from: Address,
        amount: U256,
    },
}

/// Token custody collaborator.
pub trait TokenCustody {
    /// External balance of a holder.
    fn balance_of(&self, asset: Address, holder: Address) -> U256;

    /// External total supply of an asset.
    fn total_supply(&self, asset: Address) -> U256;

    /// Apply a batch of token operations atomically.
    fn settle(&mut self, ops: &[TokenOp]) -> Result<(), CustodyError>;

    /// Install a new rebase for an asset.
    fn set_rebase(&mut self, asset: Address, rebase: Rebase);
}

/// In-memory token balances with rebase support.
#[derive(Debug, Clone, Default)]
pub struct TokenVault {
    /// (asset, holder) -> anchor balance
    balances: HashMap<(Address, Address), U256>,
    /// asset -> anchor supply
    supplies: HashMap<Address, U256>,
    /// asset -> active rebase
    rebases: HashMap<Address, Rebase>,
}

impl TokenVault {
    /// Create an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a holder with freshly minted tokens outside any engine flow.
    pub fn faucet(&mut self, asset: Address, to: Address, amount: U256) -> Result<(), CustodyError> {
        self.settle(&[TokenOp::Mint { asset, to, amount }])
    }

    /// Active rebase for an asset.
    pub fn rebase_of(&self, asset: Address) -> Rebase {
        self.rebases.get(&asset).copied().unwrap_or_default()
    }

    fn anchor(&self, asset: Address, amount: U256) -> Result<U256, CustodyError> {
        self.rebase_of(asset)
            .to_anchor(amount, Rounding::Up)
            .ok_or(CustodyError::Overflow(asset))
    }

    fn apply(&mut self, op: &TokenOp) -> Result<(), CustodyError> {
        match *op {
            TokenOp::Transfer {
                asset,
                from,
                to,
                amount,
            } => {
                let shares = self.anchor(asset, amount)?;
                self.debit(asset, from, shares, amount)?;
                self.credit(asset, to, shares)
            }
            TokenOp::Mint { asset, to, amount } => {
                let shares = self.anchor(asset, amount)?;
                self.credit(asset, to, shares)?;
                let supply = self.supplies.entry(asset).or_default();
                *supply = supply.checked_add(shares).ok_or(CustodyError::Overflow(asset))?;
                Ok(())
            }
            TokenOp::Burn { asset, from, amount } => {
                let shares = self.anchor(asset, amount)?;
                self.debit(asset, from, shares, amount)?;
                let supply = self.supplies.entry(asset).or_default();
                *supply = supply.saturating_sub(shares);
                Ok(())
            }
        }
    }

    fn debit(
        &mut self,
        asset: Address,
        holder: Address,
        shares: U256,
        amount: U256,
    ) -> Result<(), CustodyError> {
        let balance = self.balances.entry((asset, holder)).or_default();
        if *balance < shares {
            let available = self
                .rebases
                .get(&asset)
                .copied()
                .unwrap_or_default()
                .to_external(*balance, Rounding::Down)
                .unwrap_or(U256::MAX);
            return Err(CustodyError::InsufficientBalance {
                asset,
                holder,
                available,
                required: amount,
            });
        }
        *balance -= shares;
        Ok(())
    }

    fn credit(&mut self, asset: Address, holder: Address, shares: U256) -> Result<(), CustodyError> {
        let balance = self.balances.entry((asset, holder)).or_default();
        *balance = balance.checked_add(shares).ok_or(CustodyError::Overflow(asset))?;
        Ok(())
    }
}

impl TokenCustody for TokenVault {
    fn balance_of(&self, asset: Address, holder: Address) -> U256 {
        let shares = self.balances.get(&(asset, holder)).copied().unwrap_or_default();
        self.rebase_of(asset)
            .to_external(shares, Rounding::Down)
            .unwrap_or(U256::MAX)
    }

    fn total_supply(&self, asset: Address) -> U256 {
        let shares = self.supplies.get(&asset).copied().unwrap_or_default();
        self.rebase_of(asset)
            .to_external(shares, Rounding::Down)
            .unwrap_or(U256::MAX)
    }

    fn settle(&mut self, ops: &[TokenOp]) -> Result<(), CustodyError> {
        if ops.is_empty() {
            return Ok(());
        }

        // Work on a copy so a failing op leaves every balance untouched.
        let mut scratch = self.clone();
        for op in ops {
            scratch.apply(op)?;
        }
        *self = scratch;

        debug!(ops = ops.len(), "Settled token batch");
        Ok(())
    }

    fn set_rebase(&mut self, asset: Address, rebase: Rebase) {
        self.rebases.insert(asset, rebase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut vault = TokenVault::new();
        let (asset, alice, bob) = (addr(1), addr(2), addr(3));
        vault.faucet(asset, alice, U256::from(100u64)).unwrap();

        vault
            .settle(&[TokenOp::Transfer {
                asset,
                from: alice,
                to: bob,
                amount: U256::from(40u64),
            }])
            .unwrap();

        assert_eq!(vault.balance_of(asset, alice), U256::from(60u64));
        assert_eq!(vault.balance_of(asset, bob), U256::from(40u64));
        assert_eq!(vault.total_supply(asset), U256::from(100u64));
    }

    #[test]
    fn test_failed_batch_is_not_applied() {
        let mut vault = TokenVault::new();
        let (asset, alice, bob) = (addr(1), addr(2), addr(3));
        vault.faucet(asset, alice, U256::from(100u64)).unwrap();

        let result = vault.settle(&[
            TokenOp::Transfer {
                asset,
                from: alice,
                to: bob,
                amount: U256::from(50u64),
            },
            TokenOp::Burn {
                asset,
                from: bob,
                amount: U256::from(80u64),
            },
        ]);

        assert!(matches!(result, Err(CustodyError::InsufficientBalance { .. })));
        assert_eq!(vault.balance_of(asset, alice), U256::from(100u64));
        assert_eq!(vault.balance_of(asset, bob), U256::ZERO);
    }

    #[test]
    fn test_rebase_scales_balances_and_supply() {
        let mut vault = TokenVault::new();
        let (asset, alice) = (addr(1), addr(2));
        vault.faucet(asset, alice, U256::from(1_000u64)).unwrap();

        vault.set_rebase(asset, Rebase::split(4).unwrap());

        assert_eq!(vault.balance_of(asset, alice), U256::from(4_000u64));
        assert_eq!(vault.total_supply(asset), U256::from(4_000u64));

        vault
            .settle(&[TokenOp::Burn {
                asset,
                from: alice,
                amount: U256::from(4_000u64),
            }])
            .unwrap();
        assert_eq!(vault.balance_of(asset, alice), U256::ZERO);
        assert_eq!(vault.total_supply(asset), U256::ZERO);
    }
}
