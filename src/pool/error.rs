use crate::core::currency::Currency;
use crate::core::pool_key::PoolId;
use crate::core::vault::VaultError;
use crate::math::MathError;
use alloy_primitives::U256;
use thiserror::Error;

/// Errors raised by pools and the pool manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("currencies not sorted: {currency0} must be below {currency1}")]
    CurrencyNotSorted {
        currency0: Currency,
        currency1: Currency,
    },
    #[error("sqrt price {0} is outside the supported range")]
    InvalidSqrtPrice(U256),
    #[error("pool {0} is already initialized")]
    PoolAlreadyInitialized(PoolId),
    #[error("pool {0} is not initialized")]
    PoolNotInitialized(PoolId),
    #[error("fee {0} must be below 1000000")]
    InvalidFee(u32),
    #[error("tick spacing {0} must be in 1..=16383")]
    InvalidTickSpacing(i16),
    #[error("operation requires an open lock")]
    Unauthorized,
    #[error("lock released with {currency} delta {delta} unsettled")]
    CurrencyNotSettled { currency: Currency, delta: i128 },
    #[error("lock released after an operation failed to book its deltas")]
    LockReverted,
    #[error("tick range [{lower}, {upper}) is empty")]
    InvalidTickRange { lower: i32, upper: i32 },
    #[error("tick {0} is out of bounds")]
    TickOutOfBounds(i32),
    #[error("tick {tick} is not a multiple of spacing {tick_spacing}")]
    TickMisaligned { tick: i32, tick_spacing: i16 },
    #[error("position holds {available} liquidity, cannot remove {requested}")]
    InsufficientLiquidity { available: u128, requested: u128 },
    #[error("cannot poke a position with no liquidity")]
    EmptyPosition,
    #[error("tick {0} would exceed the maximum liquidity per tick")]
    TickLiquidityOverflow(i32),
    #[error("swap amount must be nonzero")]
    SwapAmountZero,
    #[error("price limit {0} is on the wrong side of the current price")]
    PriceLimitOutOfBounds(U256),
    #[error("pool has no in-range liquidity to receive fees")]
    NoLiquidityToReceiveFees,
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}
