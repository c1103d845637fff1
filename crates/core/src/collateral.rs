//! Collateral deposits and withdrawals.

use alloy::primitives::{Address, U256};
use tracing::{debug, info};

use crate::config::Parameters;
use crate::engine::Tx;
use crate::error::{KreskoError, Result};
use crate::events::Event;
use crate::math::Rounding;
use kresko_chain::TokenOp;

/// Deposit `amount` (external units) of `asset` from the account's wallet.
pub(crate) fn deposit(tx: &mut Tx<'_>, asset: Address, amount: U256) -> Result<()> {
    if amount.is_zero() {
        return Err(KreskoError::ZeroAmount);
    }
    let registry = tx.valuation.registry;
    let params = tx.valuation.params;
    let collateral = registry.collateral(&asset)?;
    if !collateral.exists {
        return Err(KreskoError::AssetDisabled(asset));
    }

    let anchor = registry
        .rebase_of(&asset)
        .to_anchor(amount, Rounding::Down)
        .ok_or(KreskoError::MathOverflow)?;
    if anchor.is_zero() {
        return Err(KreskoError::AmountBelowDust {
            asset,
            amount,
            minimum: U256::from(1u8),
        });
    }

    let position = tx
        .state
        .add_collateral(asset, anchor, params.max_positions_per_account)?;
    if collateral.is_rebasing() {
        check_rebasing_dust(params, asset, position)?;
    }

    tx.queue(TokenOp::Transfer {
        asset,
        from: tx.account,
        to: tx.protocol,
        amount,
    });
    tx.emit(Event::CollateralDeposited {
        account: tx.account,
        asset,
        amount,
    });
    info!(
        account = %tx.account,
        asset = %asset,
        amount = %amount,
        position = %position,
        "Collateral deposited"
    );
    Ok(())
}

/// Withdraw up to `amount` (external units) of `asset` to the account's wallet.
///
/// Requests above the deposit withdraw all of it. Returns the amount paid out.
pub(crate) fn withdraw(tx: &mut Tx<'_>, asset: Address, amount: U256, deposit_index: usize) -> Result<U256> {
    if amount.is_zero() {
        return Err(KreskoError::ZeroAmount);
    }
    let valuation = tx.valuation;
    let collateral = valuation.registry.collateral(&asset)?;

    let position = tx.state.collateral_amount(&asset);
    let external = valuation.collateral_external(&asset, position)?;
    let (anchor_out, amount_out) = if amount >= external {
        (position, external)
    } else {
        let anchor = valuation
            .registry
            .rebase_of(&asset)
            .to_anchor(amount, Rounding::Up)
            .ok_or(KreskoError::MathOverflow)?;
        (anchor.min(position), amount)
    };

    let remaining = tx.state.decrease_collateral(asset, anchor_out, deposit_index)?;
    if collateral.is_rebasing() {
        check_rebasing_dust(valuation.params, asset, remaining)?;
    }
    tx.ensure_solvent()?;

    if amount_out < amount {
        debug!(requested = %amount, withdrawn = %amount_out, "Clamped withdrawal to deposit");
    }
    tx.queue(TokenOp::Transfer {
        asset,
        from: tx.protocol,
        to: tx.account,
        amount: amount_out,
    });
    tx.emit(Event::CollateralWithdrawn {
        account: tx.account,
        asset,
        amount: amount_out,
    });
    info!(
        account = %tx.account,
        asset = %asset,
        amount = %amount_out,
        remaining = %remaining,
        "Collateral withdrawn"
    );
    Ok(amount_out)
}

/// A rebasing collateral position must be empty or above the dust floor.
fn check_rebasing_dust(params: &Parameters, asset: Address, position: U256) -> Result<()> {
    if !position.is_zero() && position < params.min_rebasing_collateral {
        return Err(KreskoError::AmountBelowDust {
            asset,
            amount: position,
            minimum: params.min_rebasing_collateral,
        });
    }
    Ok(())
}
