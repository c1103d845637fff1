//! Kresko asset minting and burning.
//!
//! Open and close fees are charged in collateral: the account's deposit with
//! the largest market value pays, capped at that deposit. Any part of the fee
//! the deposit cannot cover is forgiven.

use alloy::primitives::{Address, U256};
use tracing::{debug, info, warn};

use crate::engine::Tx;
use crate::error::{KreskoError, Result};
use crate::events::{Event, FeeKind};
use crate::ledger::check_index;
use crate::math::{wad_mul_up, Rounding};
use crate::registry::KrAsset;
use kresko_chain::TokenOp;

/// Mint `amount` (external units) of `asset` to the account as new debt.
pub(crate) fn mint(tx: &mut Tx<'_>, asset: Address, amount: U256) -> Result<()> {
    if amount.is_zero() {
        return Err(KreskoError::ZeroAmount);
    }
    let valuation = tx.valuation;
    let params = valuation.params;
    let kr_asset = valuation.registry.kresko_asset(&asset)?;
    if !kr_asset.exists {
        return Err(KreskoError::AssetDisabled(asset));
    }
    if !valuation.oracle.is_market_open(kr_asset.oracle) {
        warn!(asset = %asset, "Mint rejected, market closed");
        return Err(KreskoError::MarketClosed(asset));
    }

    let new_supply = tx
        .total_supply(asset)
        .checked_add(amount)
        .ok_or(KreskoError::MathOverflow)?;
    if new_supply > kr_asset.supply_limit {
        return Err(KreskoError::SupplyLimitExceeded {
            asset,
            new_supply,
            limit: kr_asset.supply_limit,
        });
    }

    let debt_index = tx.accrue(&asset)?;
    let anchor = valuation
        .registry
        .rebase_of(&asset)
        .to_anchor(amount, Rounding::Up)
        .ok_or(KreskoError::MathOverflow)?;

    let new_debt = tx
        .state
        .debt_amount(&asset)
        .checked_add(anchor)
        .ok_or(KreskoError::MathOverflow)?;
    let debt_value = valuation.debt_value(kr_asset, new_debt, true)?;
    if debt_value < params.minimum_debt_value {
        return Err(KreskoError::DebtBelowMinimum {
            value: debt_value,
            minimum: params.minimum_debt_value,
        });
    }

    let mint_value = valuation.value_of(kr_asset, amount, true, Rounding::Up)?;
    charge_fee(tx, FeeKind::Open, kr_asset, wad_mul_up(mint_value, kr_asset.open_fee)?)?;

    tx.state
        .add_debt(asset, anchor, debt_index, params.max_positions_per_account)?;
    tx.ensure_solvent()?;

    tx.queue(TokenOp::Mint {
        asset,
        to: tx.account,
        amount,
    });
    tx.emit(Event::KreskoAssetMinted {
        account: tx.account,
        asset,
        amount,
    });
    info!(
        account = %tx.account,
        asset = %asset,
        amount = %amount,
        value = %mint_value,
        "Kresko asset minted"
    );
    Ok(())
}

/// Burn up to `amount` (external units) of `asset` from the account's wallet.
///
/// Burns are clamped to the debt, and a burn that would leave a remainder
/// worth less than the minimum debt value closes the position instead.
/// Returns the amount burned.
pub(crate) fn burn(tx: &mut Tx<'_>, asset: Address, amount: U256, debt_index: usize) -> Result<U256> {
    if amount.is_zero() {
        return Err(KreskoError::ZeroAmount);
    }
    let valuation = tx.valuation;
    let params = valuation.params;
    let kr_asset = valuation.registry.kresko_asset(&asset)?;
    check_index(tx.state.minted_kresko_assets(), asset, debt_index)?;

    let position = tx.state.debt_amount(&asset);
    let external_debt = valuation.debt_external(&asset, position)?;
    let (mut burn_amount, mut anchor) = if amount >= external_debt {
        (external_debt, position)
    } else {
        let anchor = valuation
            .registry
            .rebase_of(&asset)
            .to_anchor(amount, Rounding::Down)
            .ok_or(KreskoError::MathOverflow)?;
        (amount, anchor.min(position))
    };

    let remainder = position - anchor;
    if !remainder.is_zero() {
        let remainder_value = valuation.debt_value(kr_asset, remainder, true)?;
        if remainder_value < params.minimum_debt_value {
            debug!(
                asset = %asset,
                remainder_value = %remainder_value,
                "Burn would leave dust debt, closing position"
            );
            burn_amount = external_debt;
            anchor = position;
        }
    }
    if anchor.is_zero() {
        return Err(KreskoError::ZeroAmount);
    }

    let burn_value = valuation.value_of(kr_asset, burn_amount, true, Rounding::Down)?;
    charge_fee(tx, FeeKind::Close, kr_asset, wad_mul_up(burn_value, kr_asset.close_fee)?)?;

    let remaining = tx.state.decrease_debt(asset, anchor, debt_index)?;
    tx.queue(TokenOp::Burn {
        asset,
        from: tx.account,
        amount: burn_amount,
    });
    tx.emit(Event::KreskoAssetBurned {
        account: tx.account,
        asset,
        amount: burn_amount,
    });
    if remaining.is_zero() {
        tx.emit(Event::DebtPositionClosed {
            account: tx.account,
            asset,
        });
    }
    info!(
        account = %tx.account,
        asset = %asset,
        amount = %burn_amount,
        remaining = %remaining,
        "Kresko asset burned"
    );
    Ok(burn_amount)
}

/// Move `fee_value` worth of collateral to the fee recipient.
fn charge_fee(tx: &mut Tx<'_>, kind: FeeKind, kr_asset: &KrAsset, fee_value: U256) -> Result<()> {
    if fee_value.is_zero() {
        return Ok(());
    }
    let valuation = tx.valuation;
    let Some((paid_asset, _)) = valuation.largest_collateral(&tx.state)? else {
        debug!(kind = ?kind, "No collateral to pay fee from");
        return Ok(());
    };
    let collateral = valuation.registry.collateral(&paid_asset)?;

    let position = tx.state.collateral_amount(&paid_asset);
    let external = valuation.collateral_external(&paid_asset, position)?;
    let mut paid_amount = valuation.amount_for(collateral, fee_value, true, Rounding::Up)?;
    let anchor = if paid_amount >= external {
        paid_amount = external;
        position
    } else {
        valuation
            .registry
            .rebase_of(&paid_asset)
            .to_anchor(paid_amount, Rounding::Up)
            .ok_or(KreskoError::MathOverflow)?
            .min(position)
    };

    let index = tx
        .state
        .collateral_index(&paid_asset)
        .ok_or(KreskoError::AssetNotFound(paid_asset))?;
    tx.state.decrease_collateral(paid_asset, anchor, index)?;
    let paid_value = valuation.value_of(collateral, paid_amount, true, Rounding::Down)?;

    tx.queue(TokenOp::Transfer {
        asset: paid_asset,
        from: tx.protocol,
        to: valuation.params.fee_recipient,
        amount: paid_amount,
    });
    tx.emit(Event::fee_paid(
        kind,
        tx.account,
        paid_asset,
        paid_amount,
        paid_value,
        kr_asset.address,
    ));
    debug!(
        kind = ?kind,
        paid_asset = %paid_asset,
        paid_amount = %paid_amount,
        fee_value = %fee_value,
        "Fee charged"
    );
    Ok(())
}
