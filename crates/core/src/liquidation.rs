//! Liquidation sizing and execution.
//!
//! A liquidator repays part of an unhealthy account's debt in one Kresko
//! asset and receives one of its collateral deposits worth the repaid value
//! times that collateral's liquidation incentive. The repaid value is capped
//! at the amount that brings the account back to the liquidation threshold,
//! so no single call can over-liquidate. Liquidations charge no fees.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::Tx;
use crate::error::{KreskoError, Result};
use crate::events::Event;
use crate::ledger::{check_index, Account};
use crate::math::{wad_div_up, wad_mul, wad_mul_up, Rounding};
use crate::registry::{CollateralAsset, KrAsset};
use crate::valuation::Valuation;
use kresko_chain::TokenOp;

/// One liquidation request; indices are resolved by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationCall {
    pub account: Address,
    pub repay_asset: Address,
    pub repay_amount: U256,
    pub seize_asset: Address,
    #[serde(default)]
    pub allow_seize_underflow: bool,
}

/// Result of an executed liquidation, external units and USD WAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidationOutcome {
    pub repay_amount: U256,
    pub repay_value: U256,
    pub seized_amount: U256,
    pub seized_value: U256,
}

/// A (repay, seize) pair and the most value it can liquidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidationCandidate {
    pub repay_asset: Address,
    pub seize_asset: Address,
    pub max_value: U256,
}

/// Inputs of the max-liquidation formula, all USD WAD or WAD ratios.
#[derive(Debug, Clone, Copy)]
pub struct MaxLiquidationInputs {
    /// Protocol collateral value (cFactor applied)
    pub collateral_value: U256,
    /// Protocol debt value (k-factor applied)
    pub debt_value: U256,
    pub liquidation_threshold: U256,
    pub k_factor: U256,
    pub c_factor: U256,
    pub incentive: U256,
    /// Market value of the repay asset debt position
    pub repay_position_value: U256,
    /// Market value of the seize asset deposit, rounded up
    pub seize_deposit_value: U256,
}

/// Repay value (USD, factor-free) that restores the account to the threshold.
///
/// Solves `C - R * incentive * cFactor >= (D - R * k) * LT` for `R`. When
/// seizing costs at least as much collateral weight as the repaid debt
/// frees, no repay value restores health and the pair is capped only by the
/// positions themselves.
pub fn max_liquidatable_value(inputs: &MaxLiquidationInputs) -> Result<U256> {
    let required = wad_mul_up(inputs.debt_value, inputs.liquidation_threshold)?;
    if inputs.collateral_value >= required {
        return Ok(U256::ZERO);
    }
    let shortfall = required - inputs.collateral_value;

    let debt_weight = wad_mul(inputs.k_factor, inputs.liquidation_threshold)?;
    let seize_weight = wad_mul(inputs.incentive, inputs.c_factor)?;
    let restoring = if debt_weight > seize_weight {
        wad_div_up(shortfall, debt_weight - seize_weight)?
    } else {
        U256::MAX
    };

    let seizable = wad_div_up(inputs.seize_deposit_value, inputs.incentive)?;
    Ok(restoring.min(inputs.repay_position_value).min(seizable))
}

/// Reject a collateral whose seize weight (`incentive * cFactor`) is not
/// below the liquidation threshold.
///
/// Kresko assets have `k >= 1`, so this keeps `k * LT > incentive * cFactor`
/// for every pair and each liquidation moves the account toward health.
pub fn check_restorable(liquidation_threshold: U256, collateral: &CollateralAsset) -> Result<()> {
    let seize_weight = wad_mul(collateral.liquidation_incentive, collateral.factor)?;
    if seize_weight >= liquidation_threshold {
        return Err(KreskoError::InvalidParameter(format!(
            "{}: incentive * collateral factor must be below the liquidation threshold",
            collateral.symbol
        )));
    }
    Ok(())
}

/// Protocol collateral and debt values when the account is liquidatable.
fn liquidatable_values(valuation: &Valuation<'_>, account: &Account) -> Result<Option<(U256, U256)>> {
    if account.minted_kresko_assets().is_empty() {
        return Ok(None);
    }
    let collateral_value = valuation.account_collateral_value(account)?;
    let debt_value = valuation.account_debt_value(account)?;
    let required = wad_mul_up(debt_value, valuation.params.liquidation_threshold)?;
    if collateral_value < required {
        Ok(Some((collateral_value, debt_value)))
    } else {
        Ok(None)
    }
}

/// Whether the account's collateral is below the liquidation threshold.
pub fn is_liquidatable(valuation: &Valuation<'_>, account: &Account) -> Result<bool> {
    Ok(liquidatable_values(valuation, account)?.is_some())
}

fn pair_max(
    valuation: &Valuation<'_>,
    account: &Account,
    (collateral_value, debt_value): (U256, U256),
    repay: &KrAsset,
    seize: &CollateralAsset,
) -> Result<U256> {
    let inputs = MaxLiquidationInputs {
        collateral_value,
        debt_value,
        liquidation_threshold: valuation.params.liquidation_threshold,
        k_factor: repay.k_factor,
        c_factor: seize.factor,
        incentive: seize.liquidation_incentive,
        repay_position_value: valuation.debt_value(repay, account.debt_amount(&repay.address), true)?,
        seize_deposit_value: valuation.value_of(
            seize,
            valuation.collateral_external(&seize.address, account.collateral_amount(&seize.address))?,
            true,
            Rounding::Up,
        )?,
    };
    let max = max_liquidatable_value(&inputs)?;
    debug!(
        repay = %repay.address,
        seize = %seize.address,
        collateral_value = %collateral_value,
        debt_value = %debt_value,
        max_value = %max,
        "Computed max liquidation"
    );
    Ok(max)
}

/// Max liquidatable value for a pair, `None` when the account is healthy.
pub fn max_liquidation(
    valuation: &Valuation<'_>,
    account: &Account,
    repay: &KrAsset,
    seize: &CollateralAsset,
) -> Result<Option<U256>> {
    match liquidatable_values(valuation, account)? {
        Some(values) => pair_max(valuation, account, values, repay, seize).map(Some),
        None => Ok(None),
    }
}

/// Every liquidatable (repay, seize) pair of the account, largest first.
pub fn candidates(valuation: &Valuation<'_>, account: &Account) -> Result<Vec<LiquidationCandidate>> {
    let Some(values) = liquidatable_values(valuation, account)? else {
        return Ok(Vec::new());
    };
    let mut candidates = Vec::new();
    for repay_asset in account.minted_kresko_assets() {
        let repay = valuation.registry.kresko_asset(repay_asset)?;
        for seize_asset in account.deposited_collateral_assets() {
            let seize = valuation.registry.collateral(seize_asset)?;
            let max_value = pair_max(valuation, account, values, repay, seize)?;
            if !max_value.is_zero() {
                candidates.push(LiquidationCandidate {
                    repay_asset: *repay_asset,
                    seize_asset: *seize_asset,
                    max_value,
                });
            }
        }
    }
    candidates.sort_by(|a, b| b.max_value.cmp(&a.max_value));
    Ok(candidates)
}

/// Execute one liquidation of `tx.account` by `liquidator`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn liquidate(
    tx: &mut Tx<'_>,
    liquidator: Address,
    repay_asset: Address,
    repay_amount: U256,
    seize_asset: Address,
    repay_index: usize,
    seize_index: usize,
    allow_seize_underflow: bool,
) -> Result<LiquidationOutcome> {
    if liquidator == tx.account {
        return Err(KreskoError::SelfLiquidation);
    }
    if repay_amount.is_zero() {
        return Err(KreskoError::ZeroAmount);
    }
    let valuation = tx.valuation;
    let registry = valuation.registry;
    let repay = registry.kresko_asset(&repay_asset)?;
    let seize = registry.collateral(&seize_asset)?;
    if !valuation.oracle.is_market_open(repay.oracle) {
        return Err(KreskoError::MarketClosed(repay_asset));
    }
    check_index(tx.state.minted_kresko_assets(), repay_asset, repay_index)?;
    check_index(tx.state.deposited_collateral_assets(), seize_asset, seize_index)?;

    let Some(max_value) = max_liquidation(&valuation, &tx.state, repay, seize)? else {
        warn!(account = %tx.account, "Account is not liquidatable");
        return Err(KreskoError::NotLiquidatable);
    };

    // Repay side
    let debt_position = tx.state.debt_amount(&repay_asset);
    let external_debt = valuation.debt_external(&repay_asset, debt_position)?;
    let requested_value = valuation.value_of(repay, repay_amount, true, Rounding::Up)?;
    let repay_amount = if requested_value > max_value {
        valuation.amount_for(repay, max_value, true, Rounding::Down)?
    } else {
        repay_amount
    }
    .min(external_debt);
    let repaid_anchor = if repay_amount == external_debt {
        debt_position
    } else {
        registry
            .rebase_of(&repay_asset)
            .to_anchor(repay_amount, Rounding::Down)
            .ok_or(KreskoError::MathOverflow)?
            .min(debt_position)
    };
    if repaid_anchor.is_zero() {
        return Err(KreskoError::NothingToSeize);
    }
    let repay_value = valuation.value_of(repay, repay_amount, true, Rounding::Down)?;

    // Seize side
    let seized_value = wad_mul(repay_value, seize.liquidation_incentive)?;
    let mut seized_amount = valuation.amount_for(seize, seized_value, true, Rounding::Down)?;
    if seized_amount.is_zero() {
        return Err(KreskoError::NothingToSeize);
    }
    let deposit = tx.state.collateral_amount(&seize_asset);
    let external_deposit = valuation.collateral_external(&seize_asset, deposit)?;
    let seized_anchor = if seized_amount > external_deposit {
        if !allow_seize_underflow {
            return Err(KreskoError::SeizeUnderflow {
                seized: seized_amount,
                deposit: external_deposit,
            });
        }
        debug!(seized = %seized_amount, deposit = %external_deposit, "Seizing entire deposit");
        seized_amount = external_deposit;
        deposit
    } else if seized_amount == external_deposit {
        deposit
    } else {
        registry
            .rebase_of(&seize_asset)
            .to_anchor(seized_amount, Rounding::Up)
            .ok_or(KreskoError::MathOverflow)?
            .min(deposit)
    };

    let remaining_debt = tx.state.decrease_debt(repay_asset, repaid_anchor, repay_index)?;
    tx.state.decrease_collateral(seize_asset, seized_anchor, seize_index)?;

    tx.queue(TokenOp::Burn {
        asset: repay_asset,
        from: liquidator,
        amount: repay_amount,
    });
    tx.queue(TokenOp::Transfer {
        asset: seize_asset,
        from: tx.protocol,
        to: liquidator,
        amount: seized_amount,
    });
    tx.emit(Event::LiquidationOccurred {
        account: tx.account,
        liquidator,
        repay_kresko_asset: repay_asset,
        repay_amount,
        repay_value,
        seized_collateral_asset: seize_asset,
        collateral_sent: seized_amount,
        seized_value,
    });
    if remaining_debt.is_zero() {
        tx.emit(Event::DebtPositionClosed {
            account: tx.account,
            asset: repay_asset,
        });
    }
    info!(
        account = %tx.account,
        liquidator = %liquidator,
        repay_asset = %repay_asset,
        repay_amount = %repay_amount,
        seize_asset = %seize_asset,
        seized_amount = %seized_amount,
        "Liquidation executed"
    );

    Ok(LiquidationOutcome {
        repay_amount,
        repay_value,
        seized_amount,
        seized_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{ONE_PERCENT, WAD};
    use proptest::prelude::*;

    fn usd(v: u64) -> U256 {
        U256::from(v) * WAD
    }

    fn pct(v: u64) -> U256 {
        ONE_PERCENT * U256::from(v)
    }

    fn scenario_inputs() -> MaxLiquidationInputs {
        MaxLiquidationInputs {
            collateral_value: usd(16_000),
            debt_value: usd(12_000),
            liquidation_threshold: pct(140),
            k_factor: pct(120),
            c_factor: pct(80),
            incentive: pct(110),
            repay_position_value: usd(10_000),
            seize_deposit_value: usd(20_000),
        }
    }

    #[test]
    fn test_max_restores_threshold() {
        // (12000 * 1.4 - 16000) / (1.2 * 1.4 - 1.1 * 0.8) = 800 / 0.8
        assert_eq!(max_liquidatable_value(&scenario_inputs()).unwrap(), usd(1_000));
    }

    #[test]
    fn test_healthy_account_has_zero_max() {
        let inputs = MaxLiquidationInputs {
            collateral_value: usd(16_800),
            ..scenario_inputs()
        };
        assert_eq!(max_liquidatable_value(&inputs).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_max_clamped_by_positions() {
        let inputs = MaxLiquidationInputs {
            repay_position_value: usd(300),
            ..scenario_inputs()
        };
        assert_eq!(max_liquidatable_value(&inputs).unwrap(), usd(300));

        let inputs = MaxLiquidationInputs {
            seize_deposit_value: usd(550),
            ..scenario_inputs()
        };
        assert_eq!(max_liquidatable_value(&inputs).unwrap(), usd(500));

        // Rounded up so the seized value can reach the whole deposit
        let inputs = MaxLiquidationInputs {
            seize_deposit_value: U256::from(10u64),
            ..scenario_inputs()
        };
        assert_eq!(max_liquidatable_value(&inputs).unwrap(), U256::from(10u64));
    }

    #[test]
    fn test_check_restorable() {
        let asset = crate::registry::tests::collateral(0x11, "COLL", 80);
        assert!(check_restorable(pct(140), &asset).is_ok());
        assert!(matches!(
            check_restorable(pct(110), &CollateralAsset { factor: WAD, ..asset }),
            Err(KreskoError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_non_restorable_pair_is_capped_by_positions() {
        // k * LT == incentive * cFactor: repaying never improves the ratio
        let inputs = MaxLiquidationInputs {
            collateral_value: usd(12_000),
            k_factor: WAD,
            liquidation_threshold: pct(110),
            c_factor: WAD,
            incentive: pct(110),
            ..scenario_inputs()
        };
        assert_eq!(max_liquidatable_value(&inputs).unwrap(), usd(10_000));
    }

    proptest! {
        #[test]
        fn prop_max_restores_threshold(
            debt in 1_000u64..100_000,
            ratio_pct in 100u64..140,
            k_pct in 100u64..200,
            c_pct in 10u64..90,
            incentive_pct in 100u64..115,
        ) {
            let inputs = MaxLiquidationInputs {
                collateral_value: usd(debt) * U256::from(ratio_pct) / U256::from(100u64),
                debt_value: usd(debt),
                liquidation_threshold: pct(140),
                k_factor: pct(k_pct),
                c_factor: pct(c_pct),
                incentive: pct(incentive_pct),
                repay_position_value: U256::MAX,
                seize_deposit_value: usd(1_000_000_000),
            };
            let max = max_liquidatable_value(&inputs).unwrap();
            let debt_weight = wad_mul(inputs.k_factor, inputs.liquidation_threshold).unwrap();
            let seize_weight = wad_mul(inputs.incentive, inputs.c_factor).unwrap();
            prop_assume!(!max.is_zero() && debt_weight > seize_weight);

            // Liquidating exactly `max` leaves the account at or above the threshold
            let seized = wad_mul(wad_mul(max, inputs.incentive).unwrap(), inputs.c_factor).unwrap();
            let repaid = wad_mul(max, inputs.k_factor).unwrap();
            prop_assume!(repaid <= inputs.debt_value && seized <= inputs.collateral_value);
            let collateral_after = inputs.collateral_value - seized;
            let required_after = wad_mul(inputs.debt_value - repaid, inputs.liquidation_threshold).unwrap();
            prop_assert!(collateral_after + U256::from(2u8) >= required_after);
        }
    }
}
