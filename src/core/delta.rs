use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A pair of signed currency amounts owed across a pool's two currencies.
///
/// A positive amount is owed by the caller to the pool manager; a negative
/// amount is owed by the pool manager to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub amount0: i128,
    pub amount1: i128,
}

impl BalanceDelta {
    pub const ZERO: BalanceDelta = BalanceDelta {
        amount0: 0,
        amount1: 0,
    };

    pub const fn new(amount0: i128, amount1: i128) -> Self {
        Self { amount0, amount1 }
    }

    pub fn is_zero(&self) -> bool {
        self.amount0 == 0 && self.amount1 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self {
            amount0: self.amount0.checked_add(other.amount0)?,
            amount1: self.amount1.checked_add(other.amount1)?,
        })
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        Some(Self {
            amount0: self.amount0.checked_sub(other.amount0)?,
            amount1: self.amount1.checked_sub(other.amount1)?,
        })
    }
}

impl Add for BalanceDelta {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.amount0 + other.amount0, self.amount1 + other.amount1)
    }
}

impl Sub for BalanceDelta {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.amount0 - other.amount0, self.amount1 - other.amount1)
    }
}

impl Neg for BalanceDelta {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount0, -self.amount1)
    }
}

impl fmt::Display for BalanceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.amount0, self.amount1)
    }
}
