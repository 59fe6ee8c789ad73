use crate::math::tick_math::{MAX_SQRT_RATIO, MIN_SQRT_RATIO};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Parameters of a swap.
///
/// `amount_specified > 0` is an exact input, `< 0` an exact output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub zero_for_one: bool,
    pub amount_specified: i128,
    pub sqrt_price_limit_x96: U256,
}

impl SwapParams {
    /// Swap with no effective price limit.
    pub fn unbounded(zero_for_one: bool, amount_specified: i128) -> Self {
        Self {
            zero_for_one,
            amount_specified,
            sqrt_price_limit_x96: if zero_for_one {
                MIN_SQRT_RATIO + U256::from(1u8)
            } else {
                MAX_SQRT_RATIO - U256::from(1u8)
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyLiquidityParams {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity_delta: i128,
    /// Distinguishes positions of one owner over the same range.
    #[serde(default)]
    pub salt: B256,
}

impl ModifyLiquidityParams {
    pub fn new(tick_lower: i32, tick_upper: i32, liquidity_delta: i128) -> Self {
        Self {
            tick_lower,
            tick_upper,
            liquidity_delta,
            salt: B256::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashParams {
    pub amount0: U256,
    pub amount1: U256,
    pub recipient: Address,
}
