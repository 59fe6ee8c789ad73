use crate::math::MathError;

/// Apply a signed liquidity change to an unsigned liquidity amount.
pub fn add_delta(liquidity: u128, delta: i128) -> Result<u128, MathError> {
    if delta < 0 {
        liquidity
            .checked_sub(delta.unsigned_abs())
            .ok_or(MathError::Underflow)
    } else {
        liquidity
            .checked_add(delta as u128)
            .ok_or(MathError::Overflow)
    }
}
