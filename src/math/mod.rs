//! Fixed-point math for concentrated-liquidity pools.
//!
//! All prices are `sqrt(price) * 2^96` (Q64.96) held in a [`U256`];
//! liquidity is a `u128`; fee growth accumulators are Q128.128.

pub mod full_math;
pub mod liquidity_math;
pub mod sqrt_price_math;
pub mod swap_math;
pub mod tick_math;

use alloy_primitives::U256;
use thiserror::Error;

/// 2^96, the Q64.96 unit.
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// 2^128, the fee growth unit.
pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

/// Errors arising from fixed-point arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("arithmetic underflow")]
    Underflow,
    #[error("tick {0} is outside [MIN_TICK, MAX_TICK]")]
    TickOutOfBounds(i32),
    #[error("sqrt price {0} is outside [MIN_SQRT_RATIO, MAX_SQRT_RATIO)")]
    SqrtPriceOutOfBounds(U256),
    #[error("next sqrt price would leave the representable range")]
    PriceOverflow,
    #[error("operation requires nonzero liquidity")]
    ZeroLiquidity,
}

/// Narrow a 256-bit amount into the `i128` range used by balance deltas.
pub fn to_i128(value: U256) -> Result<i128, MathError> {
    if value > U256::from(i128::MAX as u128) {
        return Err(MathError::Overflow);
    }
    Ok(value.to::<u128>() as i128)
}

/// Lossy conversion for display and float-domain analytics.
pub fn to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .enumerate()
        .map(|(i, limb)| (*limb as f64) * 2f64.powi(64 * i as i32))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_q_constants() {
        assert_eq!(Q96, U256::from(1u8) << 96);
        assert_eq!(Q128, U256::from(1u8) << 128);
    }

    #[test]
    fn test_to_i128_bounds() {
        assert_eq!(to_i128(U256::from(42u64)), Ok(42));
        assert_eq!(to_i128(U256::from(i128::MAX as u128)), Ok(i128::MAX));
        assert_eq!(
            to_i128(U256::from(i128::MAX as u128) + U256::from(1u8)),
            Err(MathError::Overflow)
        );
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(to_f64(Q96), 2f64.powi(96));
        assert_eq!(to_f64(U256::ZERO), 0.0);
    }
}
