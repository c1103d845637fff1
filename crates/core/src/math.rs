//! Fixed-point U256 arithmetic.
//!
//! Ratios and USD values are 18-decimal WAD numbers, debt indices and rates
//! are 27-decimal RAY numbers, token amounts use the asset's native decimals
//! and oracle prices use 8 decimals. Every helper is checked and takes an
//! explicit [`Rounding`] where a remainder can occur; callers round against
//! the account (debt up, collateral down).

use alloy::primitives::U256;

use crate::error::{KreskoError, Result};
pub use kresko_chain::{Rounding, PRICE_DECIMALS, WAD};

/// RAY constant: 1e27 for 27-decimal fixed-point arithmetic
pub const RAY: U256 = U256::from_limbs([11_515_845_246_265_065_472u64, 54_210_108, 0, 0]);

/// One percent in WAD
pub const ONE_PERCENT: U256 = U256::from_limbs([10_000_000_000_000_000u64, 0, 0, 0]);

/// Seconds in a 365-day year
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38)
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// `a * b / denominator` with explicit rounding.
#[inline]
pub fn mul_div(a: U256, b: U256, denominator: U256, rounding: Rounding) -> Result<U256> {
    if denominator.is_zero() {
        return Err(KreskoError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(KreskoError::MathOverflow)?;
    let quotient = product / denominator;
    match rounding {
        Rounding::Up if !(product % denominator).is_zero() => {
            quotient.checked_add(U256::from(1u8)).ok_or(KreskoError::MathOverflow)
        }
        _ => Ok(quotient),
    }
}

/// Multiply two WAD values: (a * b) / WAD, rounded down
#[inline(always)]
pub fn wad_mul(a: U256, b: U256) -> Result<U256> {
    mul_div(a, b, WAD, Rounding::Down)
}

/// Multiply two WAD values, rounded up
#[inline(always)]
pub fn wad_mul_up(a: U256, b: U256) -> Result<U256> {
    mul_div(a, b, WAD, Rounding::Up)
}

/// Divide two WAD values: (a * WAD) / b, rounded down
#[inline(always)]
pub fn wad_div(a: U256, b: U256) -> Result<U256> {
    mul_div(a, WAD, b, Rounding::Down)
}

/// Divide two WAD values, rounded up
#[inline(always)]
pub fn wad_div_up(a: U256, b: U256) -> Result<U256> {
    mul_div(a, WAD, b, Rounding::Up)
}

/// Multiply two RAY values: (a * b) / RAY
#[inline(always)]
pub fn ray_mul(a: U256, b: U256, rounding: Rounding) -> Result<U256> {
    mul_div(a, b, RAY, rounding)
}

/// Divide two RAY values: (a * RAY) / b
#[inline(always)]
pub fn ray_div(a: U256, b: U256, rounding: Rounding) -> Result<U256> {
    mul_div(a, RAY, b, rounding)
}

/// Normalize a native-decimals amount to 18 decimals.
#[inline]
pub fn to_wad(amount: U256, decimals: u8) -> Result<U256> {
    if decimals >= 18 {
        return Ok(amount / pow10(decimals - 18));
    }
    amount
        .checked_mul(pow10(18 - decimals))
        .ok_or(KreskoError::MathOverflow)
}

/// Scale an 18-decimal amount back to native decimals.
#[inline]
pub fn from_wad(wad: U256, decimals: u8, rounding: Rounding) -> Result<U256> {
    if decimals >= 18 {
        return wad
            .checked_mul(pow10(decimals - 18))
            .ok_or(KreskoError::MathOverflow);
    }
    mul_div(wad, U256::from(1u8), pow10(18 - decimals), rounding)
}

/// Calculate USD value from token amount and oracle price.
/// Returns value in 18-decimal WAD format.
///
/// Formula: (amount * price * 10^18) / (10^decimals * 10^8)
///
/// Example: 1000 USDC (6 decimals) at $1 price = 1000 * 10^18 WAD
#[inline]
pub fn usd_wad(amount: U256, price: U256, decimals: u8, rounding: Rounding) -> Result<U256> {
    if amount.is_zero() || price.is_zero() {
        return Ok(U256::ZERO);
    }

    // amount has `decimals` decimals, price has 8 decimals
    // result = amount * price * 10^(18 - decimals - 8)
    let scale_adjustment = 18i32 - decimals as i32 - PRICE_DECIMALS as i32;

    if scale_adjustment >= 0 {
        let raw = amount.checked_mul(price).ok_or(KreskoError::MathOverflow)?;
        raw.checked_mul(pow10(scale_adjustment as u8))
            .ok_or(KreskoError::MathOverflow)
    } else {
        mul_div(amount, price, pow10((-scale_adjustment) as u8), rounding)
    }
}

/// Inverse of [`usd_wad`]: token amount worth `value` at `price`.
///
/// Formula: (value * 10^decimals) / (price * 10^10)
#[inline]
pub fn amount_for_usd(value: U256, price: U256, decimals: u8, rounding: Rounding) -> Result<U256> {
    if value.is_zero() {
        return Ok(U256::ZERO);
    }
    let price_wad = price
        .checked_mul(pow10(18 - PRICE_DECIMALS))
        .ok_or(KreskoError::MathOverflow)?;
    mul_div(value, pow10(decimals), price_wad, rounding)
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Calculate collateral ratio in WAD: collateral / debt.
///
/// Returns U256::MAX if debt is zero.
#[inline]
pub fn ratio_wad(collateral_wad: U256, debt_wad: U256) -> Result<U256> {
    if debt_wad.is_zero() {
        return Ok(U256::MAX);
    }
    wad_div(collateral_wad, debt_wad)
}

/// Parse a decimal string ("1.5", "0.000001", "40000") into a fixed-point
/// integer with `decimals` fractional digits. Excess precision is rejected.
pub fn parse_units(value: &str, decimals: u8) -> Option<U256> {
    let value = value.trim().replace('_', "");
    let (whole, fraction) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value.as_str(), ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.len() > decimals as usize {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).ok()?
    };
    let fraction_value = if fraction.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(fraction, 10).ok()?
    };
    let fraction_scaled = fraction_value.checked_mul(pow10(decimals - fraction.len() as u8))?;

    whole.checked_mul(pow10(decimals))?.checked_add(fraction_scaled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_constant() {
        assert_eq!(RAY, pow10(27));
        assert_eq!(WAD, pow10(18));
    }

    #[test]
    fn test_mul_div_rounding() {
        let seven = U256::from(7u64);
        let two = U256::from(2u64);
        let one = U256::from(1u64);
        assert_eq!(mul_div(seven, one, two, Rounding::Down).unwrap(), U256::from(3u64));
        assert_eq!(mul_div(seven, one, two, Rounding::Up).unwrap(), U256::from(4u64));
        // Exact division never rounds up
        assert_eq!(mul_div(U256::from(8u64), one, two, Rounding::Up).unwrap(), U256::from(4u64));
    }

    #[test]
    fn test_mul_div_errors() {
        assert_eq!(
            mul_div(U256::from(1u64), U256::from(1u64), U256::ZERO, Rounding::Down),
            Err(KreskoError::DivisionByZero)
        );
        assert_eq!(
            mul_div(U256::MAX, U256::from(2u64), U256::from(1u64), Rounding::Down),
            Err(KreskoError::MathOverflow)
        );
    }

    #[test]
    fn test_usd_wad() {
        // 1000 USDC (6 decimals) at $1.00 (1e8 price)
        let amount = U256::from(1000_000000u64);
        let price = U256::from(100_000_000u64);
        let usd = usd_wad(amount, price, 6, Rounding::Down).unwrap();
        assert_eq!(usd, U256::from(1000u64) * WAD);
    }

    #[test]
    fn test_usd_wad_eth() {
        // 1.5 ETH (18 decimals) at $2000 price
        let amount = U256::from(1_500_000_000_000_000_000u128);
        let price = U256::from(200_000_000_000u64);
        let usd = usd_wad(amount, price, 18, Rounding::Down).unwrap();
        assert_eq!(usd, U256::from(3000u64) * WAD);
    }

    #[test]
    fn test_usd_wad_rounding() {
        // 1 wei at $0.5 is half a wei of USD
        let usd_down = usd_wad(U256::from(1u64), U256::from(50_000_000u64), 18, Rounding::Down).unwrap();
        let usd_up = usd_wad(U256::from(1u64), U256::from(50_000_000u64), 18, Rounding::Up).unwrap();
        assert_eq!(usd_down, U256::ZERO);
        assert_eq!(usd_up, U256::from(1u64));
    }

    #[test]
    fn test_amount_for_usd_inverts_usd_wad() {
        let price = U256::from(1_000_000_000u64); // $10
        let amount = U256::from(1000u64) * WAD;
        let value = usd_wad(amount, price, 18, Rounding::Down).unwrap();
        assert_eq!(value, U256::from(10_000u64) * WAD);
        assert_eq!(amount_for_usd(value, price, 18, Rounding::Down).unwrap(), amount);

        // 8-decimal token
        let btc = U256::from(2_0000_0000u64);
        let btc_price = U256::from(60_000_0000_0000u64);
        let value = usd_wad(btc, btc_price, 8, Rounding::Down).unwrap();
        assert_eq!(value, U256::from(120_000u64) * WAD);
        assert_eq!(amount_for_usd(value, btc_price, 8, Rounding::Down).unwrap(), btc);
    }

    #[test]
    fn test_wad_helpers() {
        let a = U256::from(3u64) * WAD;
        let b = U256::from(2u64) * WAD;
        assert_eq!(wad_mul(a, b).unwrap(), U256::from(6u64) * WAD);
        assert_eq!(wad_div(a, b).unwrap(), WAD + WAD / U256::from(2u64));
        assert_eq!(wad_div_up(U256::from(1u64), U256::from(3u64) * WAD).unwrap(), U256::from(1u64));
        assert_eq!(wad_div(U256::from(1u64), U256::from(3u64) * WAD).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_decimal_normalization() {
        let usdc = U256::from(1_500_000u64); // 1.5 with 6 decimals
        assert_eq!(to_wad(usdc, 6).unwrap(), WAD + WAD / U256::from(2u64));
        assert_eq!(from_wad(WAD + WAD / U256::from(2u64), 6, Rounding::Down).unwrap(), usdc);
        assert_eq!(from_wad(U256::from(1u64), 6, Rounding::Down).unwrap(), U256::ZERO);
        assert_eq!(from_wad(U256::from(1u64), 6, Rounding::Up).unwrap(), U256::from(1u64));
        assert_eq!(to_wad(WAD, 18).unwrap(), WAD);
    }

    #[test]
    fn test_ratio_wad() {
        let collateral = U256::from(1000u64) * WAD;
        let debt = U256::from(500u64) * WAD;
        assert_eq!(ratio_wad(collateral, debt).unwrap(), U256::from(2u64) * WAD);
        assert_eq!(ratio_wad(collateral, U256::ZERO).unwrap(), U256::MAX);
    }

    #[test]
    fn test_wad_to_f64() {
        let wad = U256::from(1000u64) * WAD;
        assert!((wad_to_f64(wad) - 1000.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1.5", 18), Some(WAD + WAD / U256::from(2u64)));
        assert_eq!(parse_units("40_000", 18), Some(U256::from(40_000u64) * WAD));
        assert_eq!(parse_units("0.000001", 18), Some(U256::from(1_000_000_000_000u64)));
        assert_eq!(parse_units(".25", 2), Some(U256::from(25u64)));
        assert_eq!(parse_units("1.123", 2), None);
        assert_eq!(parse_units("abc", 18), None);
        assert_eq!(parse_units("", 18), None);
    }

    #[test]
    fn test_pow10_lookup() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), U256::from(1_000_000_000_000_000_000u64));
    }
}
