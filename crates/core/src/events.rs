//! Domain events published by committed operations.
//!
//! Amounts are external token units at the time of the operation.

use alloy::primitives::{Address, U256};
use serde::Serialize;

/// Which fee an operation charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    CollateralDeposited {
        account: Address,
        asset: Address,
        amount: U256,
    },
    CollateralWithdrawn {
        account: Address,
        asset: Address,
        amount: U256,
    },
    KreskoAssetMinted {
        account: Address,
        asset: Address,
        amount: U256,
    },
    KreskoAssetBurned {
        account: Address,
        asset: Address,
        amount: U256,
    },
    DebtPositionClosed {
        account: Address,
        asset: Address,
    },
    OpenFeePaid {
        account: Address,
        paid_asset: Address,
        paid_amount: U256,
        paid_value: U256,
        kresko_asset: Address,
    },
    CloseFeePaid {
        account: Address,
        paid_asset: Address,
        paid_amount: U256,
        paid_value: U256,
        kresko_asset: Address,
    },
    LiquidationOccurred {
        account: Address,
        liquidator: Address,
        repay_kresko_asset: Address,
        repay_amount: U256,
        repay_value: U256,
        seized_collateral_asset: Address,
        collateral_sent: U256,
        seized_value: U256,
    },
    Rebased {
        asset: Address,
        positive: bool,
        denominator: U256,
        affected_pools: Vec<Address>,
    },
    CollateralAssetUpdated {
        asset: Address,
        factor: U256,
        liquidation_incentive: U256,
        exists: bool,
    },
    KreskoAssetUpdated {
        asset: Address,
        k_factor: U256,
        supply_limit: U256,
        exists: bool,
    },
    StabilityRateUpdated {
        asset: Address,
        debt_index: U256,
        rate: U256,
    },
    ParametersUpdated {
        minimum_collateralization_ratio: U256,
        liquidation_threshold: U256,
        minimum_debt_value: U256,
    },
}

impl Event {
    /// Fee event of the given kind.
    pub fn fee_paid(
        kind: FeeKind,
        account: Address,
        paid_asset: Address,
        paid_amount: U256,
        paid_value: U256,
        kresko_asset: Address,
    ) -> Self {
        match kind {
            FeeKind::Open => Self::OpenFeePaid {
                account,
                paid_asset,
                paid_amount,
                paid_value,
                kresko_asset,
            },
            FeeKind::Close => Self::CloseFeePaid {
                account,
                paid_asset,
                paid_amount,
                paid_value,
                kresko_asset,
            },
        }
    }

    /// Account the event concerns, if any.
    pub fn account(&self) -> Option<Address> {
        match self {
            Self::CollateralDeposited { account, .. }
            | Self::CollateralWithdrawn { account, .. }
            | Self::KreskoAssetMinted { account, .. }
            | Self::KreskoAssetBurned { account, .. }
            | Self::DebtPositionClosed { account, .. }
            | Self::OpenFeePaid { account, .. }
            | Self::CloseFeePaid { account, .. }
            | Self::LiquidationOccurred { account, .. } => Some(*account),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let event = Event::DebtPositionClosed {
            account: Address::repeat_byte(1),
            asset: Address::repeat_byte(2),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "debt_position_closed");
        assert_eq!(event.account(), Some(Address::repeat_byte(1)));
    }

    #[test]
    fn test_fee_kind_selects_variant() {
        let event = Event::fee_paid(
            FeeKind::Close,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            U256::from(5u64),
            U256::from(5u64),
            Address::repeat_byte(3),
        );
        assert!(matches!(event, Event::CloseFeePaid { .. }));
    }
}
