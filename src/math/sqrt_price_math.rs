use crate::math::full_math::{div_rounding_up, mul_div, mul_div_rounding_up};
use crate::math::{to_i128, MathError, Q96};
use alloy_primitives::U256;

/// 2^160 - 1; amounts up to this size can be shifted by 96 bits in place.
const MAX_U160: U256 = U256::from_limbs([u64::MAX, u64::MAX, 0xffff_ffff, 0]);

fn ordered(a: U256, b: U256) -> (U256, U256) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

/// Amount of token0 between two prices for a given liquidity:
/// `L * (sqrt_b - sqrt_a) / (sqrt_a * sqrt_b)`.
pub fn amount0_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (lower, upper) = ordered(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    if lower.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = upper - lower;

    if round_up {
        div_rounding_up(mul_div_rounding_up(numerator1, numerator2, upper)?, lower)
    } else {
        Ok(mul_div(numerator1, numerator2, upper)? / lower)
    }
}

/// Amount of token1 between two prices for a given liquidity:
/// `L * (sqrt_b - sqrt_a)`.
pub fn amount1_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (lower, upper) = ordered(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    if round_up {
        mul_div_rounding_up(U256::from(liquidity), upper - lower, Q96)
    } else {
        mul_div(U256::from(liquidity), upper - lower, Q96)
    }
}

/// Signed token0 amount for a liquidity change. Adding liquidity rounds up
/// (the provider pays more), removing rounds down (the provider gets less).
pub fn signed_amount0_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128, MathError> {
    if liquidity < 0 {
        let amount = amount0_delta(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-to_i128(amount)?)
    } else {
        let amount = amount0_delta(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        to_i128(amount)
    }
}

/// Signed token1 amount for a liquidity change; see [`signed_amount0_delta`].
pub fn signed_amount1_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128, MathError> {
    if liquidity < 0 {
        let amount = amount1_delta(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-to_i128(amount)?)
    } else {
        let amount = amount1_delta(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        to_i128(amount)
    }
}

fn next_sqrt_price_from_amount0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    if amount.is_zero() {
        return Ok(sqrt_price_x96);
    }
    let numerator1: U256 = U256::from(liquidity) << 96usize;

    if add {
        if let Some(product) = amount.checked_mul(sqrt_price_x96) {
            if let Some(denominator) = numerator1.checked_add(product) {
                return mul_div_rounding_up(numerator1, sqrt_price_x96, denominator);
            }
        }
        let denominator = (numerator1 / sqrt_price_x96)
            .checked_add(amount)
            .ok_or(MathError::PriceOverflow)?;
        div_rounding_up(numerator1, denominator)
    } else {
        let product = amount
            .checked_mul(sqrt_price_x96)
            .ok_or(MathError::PriceOverflow)?;
        if numerator1 <= product {
            return Err(MathError::PriceOverflow);
        }
        mul_div_rounding_up(numerator1, sqrt_price_x96, numerator1 - product)
    }
}

fn next_sqrt_price_from_amount1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    let liquidity = U256::from(liquidity);
    if add {
        let quotient = if amount <= MAX_U160 {
            (amount << 96) / liquidity
        } else {
            mul_div(amount, Q96, liquidity)?
        };
        let next = sqrt_price_x96
            .checked_add(quotient)
            .ok_or(MathError::PriceOverflow)?;
        if next > MAX_U160 {
            return Err(MathError::PriceOverflow);
        }
        Ok(next)
    } else {
        let quotient = if amount <= MAX_U160 {
            div_rounding_up(amount << 96, liquidity)?
        } else {
            mul_div_rounding_up(amount, Q96, liquidity)?
        };
        if sqrt_price_x96 <= quotient {
            return Err(MathError::PriceOverflow);
        }
        Ok(sqrt_price_x96 - quotient)
    }
}

/// Price reached after adding `amount_in` of the input token.
pub fn next_sqrt_price_from_input(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price_x96.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    if liquidity == 0 {
        return Err(MathError::ZeroLiquidity);
    }
    if zero_for_one {
        next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_in, true)
    } else {
        next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_in, true)
    }
}

/// Price reached after removing `amount_out` of the output token.
pub fn next_sqrt_price_from_output(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price_x96.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    if liquidity == 0 {
        return Err(MathError::ZeroLiquidity);
    }
    if zero_for_one {
        next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_out, false)
    } else {
        next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_out, false)
    }
}
