use crate::math::full_math::{mul_div, mul_div_rounding_up};
use crate::math::sqrt_price_math::{
    amount0_delta, amount1_delta, next_sqrt_price_from_input, next_sqrt_price_from_output,
};
use crate::math::MathError;
use alloy_primitives::U256;

/// Fees are expressed in pips: hundredths of a basis point.
pub const FEE_DENOMINATOR: u32 = 1_000_000;

/// Result of a single bounded swap step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_price_next_x96: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_amount: U256,
}

/// Swap within one liquidity range, moving from `sqrt_price_current_x96`
/// toward `sqrt_price_target_x96` but never past it.
///
/// A non-negative `amount_remaining` is an exact input (fee included); a
/// negative one is an exact output. Direction is implied by the relative
/// order of the two prices.
pub fn compute_swap_step(
    sqrt_price_current_x96: U256,
    sqrt_price_target_x96: U256,
    liquidity: u128,
    amount_remaining: i128,
    fee_pips: u32,
) -> Result<SwapStep, MathError> {
    let zero_for_one = sqrt_price_current_x96 >= sqrt_price_target_x96;
    let exact_in = amount_remaining >= 0;
    let remaining = U256::from(amount_remaining.unsigned_abs());
    let fee = U256::from(fee_pips);
    let denominator = U256::from(FEE_DENOMINATOR);

    let mut amount_in = U256::ZERO;
    let mut amount_out = U256::ZERO;

    let sqrt_price_next_x96 = if exact_in {
        let remaining_less_fee = mul_div(remaining, denominator - fee, denominator)?;
        amount_in = if zero_for_one {
            amount0_delta(sqrt_price_target_x96, sqrt_price_current_x96, liquidity, true)?
        } else {
            amount1_delta(sqrt_price_current_x96, sqrt_price_target_x96, liquidity, true)?
        };
        if remaining_less_fee >= amount_in {
            sqrt_price_target_x96
        } else {
            next_sqrt_price_from_input(
                sqrt_price_current_x96,
                liquidity,
                remaining_less_fee,
                zero_for_one,
            )?
        }
    } else {
        amount_out = if zero_for_one {
            amount1_delta(sqrt_price_target_x96, sqrt_price_current_x96, liquidity, false)?
        } else {
            amount0_delta(sqrt_price_current_x96, sqrt_price_target_x96, liquidity, false)?
        };
        if remaining >= amount_out {
            sqrt_price_target_x96
        } else {
            next_sqrt_price_from_output(sqrt_price_current_x96, liquidity, remaining, zero_for_one)?
        }
    };

    let reached_target = sqrt_price_next_x96 == sqrt_price_target_x96;

    if zero_for_one {
        if !(reached_target && exact_in) {
            amount_in =
                amount0_delta(sqrt_price_next_x96, sqrt_price_current_x96, liquidity, true)?;
        }
        if !(reached_target && !exact_in) {
            amount_out =
                amount1_delta(sqrt_price_next_x96, sqrt_price_current_x96, liquidity, false)?;
        }
    } else {
        if !(reached_target && exact_in) {
            amount_in =
                amount1_delta(sqrt_price_current_x96, sqrt_price_next_x96, liquidity, true)?;
        }
        if !(reached_target && !exact_in) {
            amount_out =
                amount0_delta(sqrt_price_current_x96, sqrt_price_next_x96, liquidity, false)?;
        }
    }

    // never hand out more than was asked for
    if !exact_in && amount_out > remaining {
        amount_out = remaining;
    }

    let fee_amount = if exact_in && !reached_target {
        // the whole remainder is consumed; whatever is not input is fee
        remaining - amount_in
    } else {
        mul_div_rounding_up(amount_in, fee, denominator - fee)?
    };

    Ok(SwapStep {
        sqrt_price_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}
