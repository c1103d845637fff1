//! Rebase records for assets whose unit balance is periodically rescaled.
//!
//! Balances of a rebasing asset are tracked in rebase-invariant "anchor" units.
//! The active [`Rebase`] maps anchor units to the amount a holder observes:
//! a positive rebase multiplies by the denominator, a negative one divides.
//! Assets that never rebased use [`Rebase::IDENTITY`].

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Rounding direction for scaled-integer division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rounding {
    /// Truncate toward zero
    #[default]
    Down,
    /// Round away from zero when a remainder exists
    Up,
}

/// Rebase validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RebaseError {
    #[error("rebase denominator {0} is below 1.0 (WAD)")]
    DenominatorTooLow(U256),
}

/// Active rebase of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebase {
    /// Direction: true multiplies anchor amounts, false divides them
    pub positive: bool,
    /// Scale in WAD, always >= 1.0
    pub denominator: U256,
}

impl Default for Rebase {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rebase {
    /// Identity rebase used by assets that never rebased.
    pub const IDENTITY: Rebase = Rebase {
        positive: true,
        denominator: WAD,
    };

    /// Create a validated rebase.
    pub fn new(denominator: U256, positive: bool) -> Result<Self, RebaseError> {
        if denominator < WAD {
            return Err(RebaseError::DenominatorTooLow(denominator));
        }
        Ok(Self {
            positive,
            denominator,
        })
    }

    /// Whole-number positive rebase (e.g. a 4:1 split).
    pub fn split(ratio: u64) -> Result<Self, RebaseError> {
        Self::new(U256::from(ratio).saturating_mul(WAD), true)
    }

    /// Whole-number negative rebase (e.g. a 1:4 reverse split).
    pub fn reverse_split(ratio: u64) -> Result<Self, RebaseError> {
        Self::new(U256::from(ratio).saturating_mul(WAD), false)
    }

    pub fn is_identity(&self) -> bool {
        self.denominator == WAD
    }

    /// Convert an anchor amount into the externally observed amount.
    ///
    /// Returns `None` on overflow.
    pub fn to_external(&self, anchor: U256, rounding: Rounding) -> Option<U256> {
        if self.is_identity() {
            return Some(anchor);
        }
        if self.positive {
            mul_div(anchor, self.denominator, WAD, rounding)
        } else {
            mul_div(anchor, WAD, self.denominator, rounding)
        }
    }

    /// Convert an externally observed amount back into anchor units.
    ///
    /// Returns `None` on overflow.
    pub fn to_anchor(&self, external: U256, rounding: Rounding) -> Option<U256> {
        if self.is_identity() {
            return Some(external);
        }
        if self.positive {
            mul_div(external, WAD, self.denominator, rounding)
        } else {
            mul_div(external, self.denominator, WAD, rounding)
        }
    }

    /// Denominator as f64 (for display/logging only).
    pub fn denominator_f64(&self) -> f64 {
        let value: u128 = self.denominator.saturating_to();
        value as f64 / 1e18
    }
}

fn mul_div(a: U256, b: U256, denominator: U256, rounding: Rounding) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let product = a.checked_mul(b)?;
    let quotient = product / denominator;
    match rounding {
        Rounding::Up if !(product % denominator).is_zero() => quotient.checked_add(U256::from(1u8)),
        _ => Some(quotient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_is_passthrough() {
        let amount = U256::from(123_456u64);
        assert_eq!(Rebase::IDENTITY.to_external(amount, Rounding::Down), Some(amount));
        assert_eq!(Rebase::IDENTITY.to_anchor(amount, Rounding::Up), Some(amount));
    }

    #[test]
    fn test_positive_rebase_multiplies() {
        let rebase = Rebase::split(4).unwrap();
        let anchor = U256::from(1_000u64);
        assert_eq!(rebase.to_external(anchor, Rounding::Down), Some(U256::from(4_000u64)));
        assert_eq!(rebase.to_anchor(U256::from(4_000u64), Rounding::Down), Some(anchor));
    }

    #[test]
    fn test_negative_rebase_divides() {
        let rebase = Rebase::reverse_split(4).unwrap();
        assert_eq!(
            rebase.to_external(U256::from(1_000u64), Rounding::Down),
            Some(U256::from(250u64))
        );
        assert_eq!(
            rebase.to_external(U256::from(1_001u64), Rounding::Up),
            Some(U256::from(251u64))
        );
    }

    #[test]
    fn test_denominator_floor() {
        assert_eq!(
            Rebase::new(WAD - U256::from(1u8), true),
            Err(RebaseError::DenominatorTooLow(WAD - U256::from(1u8)))
        );
        assert!(Rebase::new(WAD, false).unwrap().is_identity());
    }

    #[test]
    fn test_fractional_rebase_rounding() {
        // 1.5x split: 3 anchor units -> 4.5 external units
        let rebase = Rebase::new(WAD + WAD / U256::from(2u8), true).unwrap();
        let three = U256::from(3u8);
        assert_eq!(rebase.to_external(three, Rounding::Down), Some(U256::from(4u8)));
        assert_eq!(rebase.to_external(three, Rounding::Up), Some(U256::from(5u8)));
    }

    proptest! {
        #[test]
        fn prop_positive_round_trip(x in 0u128..u128::MAX / 1_000, ratio in 1u64..1_000) {
            let rebase = Rebase::split(ratio).unwrap();
            let x = U256::from(x);
            let external = rebase.to_external(x, Rounding::Down).unwrap();
            prop_assert_eq!(rebase.to_anchor(external, Rounding::Down), Some(x));
        }

        #[test]
        fn prop_negative_round_trip(k in 0u128..u64::MAX as u128, ratio in 1u64..1_000) {
            // Only multiples of the ratio are expressible without precision loss.
            let rebase = Rebase::reverse_split(ratio).unwrap();
            let x = U256::from(k) * U256::from(ratio);
            let external = rebase.to_external(x, Rounding::Down).unwrap();
            prop_assert_eq!(rebase.to_anchor(external, Rounding::Down), Some(x));
        }

        #[test]
        fn prop_round_up_never_below_round_down(x in any::<u64>(), denom in 1_000_000_000_000_000_000u128..10_000_000_000_000_000_000u128) {
            let rebase = Rebase::new(U256::from(denom), false).unwrap();
            let x = U256::from(x);
            let down = rebase.to_external(x, Rounding::Down).unwrap();
            let up = rebase.to_external(x, Rounding::Up).unwrap();
            prop_assert!(up >= down);
            prop_assert!(up - down <= U256::from(1u8));
        }
    }
}
