use crate::math::full_math::mul_div;
use crate::math::liquidity_math::add_delta;
use crate::math::Q128;
use crate::pool::error::PoolError;
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a position within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub salt: B256,
}

impl PositionKey {
    pub fn new(owner: Address, tick_lower: i32, tick_upper: i32, salt: B256) -> Self {
        Self {
            owner,
            tick_lower,
            tick_upper,
            salt,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.owner, self.tick_lower, self.tick_upper, self.salt
        )
    }
}

/// Liquidity owned over a tick range and the fee growth it has been paid up to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub liquidity: u128,
    pub fee_growth_inside0_last_x128: U256,
    pub fee_growth_inside1_last_x128: U256,
}

impl Position {
    /// Fees earned since the last touch at the current inside growth.
    pub fn fees_owed(
        &self,
        fee_growth_inside0_x128: U256,
        fee_growth_inside1_x128: U256,
    ) -> Result<(U256, U256), PoolError> {
        let liquidity = U256::from(self.liquidity);
        let fees0 = mul_div(
            fee_growth_inside0_x128.wrapping_sub(self.fee_growth_inside0_last_x128),
            liquidity,
            Q128,
        )?;
        let fees1 = mul_div(
            fee_growth_inside1_x128.wrapping_sub(self.fee_growth_inside1_last_x128),
            liquidity,
            Q128,
        )?;
        Ok((fees0, fees1))
    }

    /// Apply a liquidity change, returning the fees owed since last touch.
    /// The position is unchanged on error.
    pub fn update(
        &mut self,
        liquidity_delta: i128,
        fee_growth_inside0_x128: U256,
        fee_growth_inside1_x128: U256,
    ) -> Result<(U256, U256), PoolError> {
        if liquidity_delta == 0 && self.liquidity == 0 {
            return Err(PoolError::EmptyPosition);
        }
        if liquidity_delta < 0 && liquidity_delta.unsigned_abs() > self.liquidity {
            return Err(PoolError::InsufficientLiquidity {
                available: self.liquidity,
                requested: liquidity_delta.unsigned_abs(),
            });
        }
        let liquidity = add_delta(self.liquidity, liquidity_delta)?;
        let fees = self.fees_owed(fee_growth_inside0_x128, fee_growth_inside1_x128)?;

        self.liquidity = liquidity;
        self.fee_growth_inside0_last_x128 = fee_growth_inside0_x128;
        self.fee_growth_inside1_last_x128 = fee_growth_inside1_x128;
        Ok(fees)
    }
}
