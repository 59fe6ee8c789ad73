use crate::core::currency::Currency;
use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of the canonical key encoding:
/// `currency0[20] | currency1[20] | fee[3] | tick_spacing[2] | hooks[20] | flags[1]`.
pub const POOL_KEY_LENGTH: usize = 66;

/// Fees are hundredths of a basis point and must stay below 100%.
pub const MAX_FEE: u32 = 1_000_000;

pub const MIN_TICK_SPACING: i16 = 1;
pub const MAX_TICK_SPACING: i16 = 16_383;

/// Standard `(fee, tick_spacing)` pairs.
pub const FEE_TIERS: [(u32, i16); 4] = [(100, 1), (500, 10), (3_000, 60), (10_000, 200)];

/// Identifier of a pool: `keccak256` of its encoded key.
pub type PoolId = B256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolKeyError {
    #[error("pool key encoding must be {POOL_KEY_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
    #[error("reserved flag byte must be zero, got {0:#04x}")]
    InvalidFlags(u8),
}

/// The parameters that identify a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub currency0: Currency,
    pub currency1: Currency,
    pub fee: u32,
    pub tick_spacing: i16,
    #[serde(default)]
    pub hooks: Address,
}

impl PoolKey {
    /// Build a key with no hooks. Currencies are taken as given; use
    /// [`PoolKey::sorted`] when the order is not known.
    pub fn new(currency0: Currency, currency1: Currency, fee: u32, tick_spacing: i16) -> Self {
        Self {
            currency0,
            currency1,
            fee,
            tick_spacing,
            hooks: Address::ZERO,
        }
    }

    pub fn sorted(a: Currency, b: Currency, fee: u32, tick_spacing: i16) -> Self {
        let (currency0, currency1) = Currency::sort(a, b);
        Self::new(currency0, currency1, fee, tick_spacing)
    }

    /// Key for one of the standard fee tiers.
    pub fn with_fee_tier(a: Currency, b: Currency, fee: u32) -> Option<Self> {
        tick_spacing_for_fee(fee).map(|spacing| Self::sorted(a, b, fee, spacing))
    }

    pub fn is_sorted(&self) -> bool {
        self.currency0 < self.currency1
    }

    pub fn encode(&self) -> [u8; POOL_KEY_LENGTH] {
        let mut out = [0u8; POOL_KEY_LENGTH];
        out[0..20].copy_from_slice(self.currency0.address().as_slice());
        out[20..40].copy_from_slice(self.currency1.address().as_slice());
        out[40..43].copy_from_slice(&self.fee.to_be_bytes()[1..4]);
        out[43..45].copy_from_slice(&self.tick_spacing.to_be_bytes());
        out[45..65].copy_from_slice(self.hooks.as_slice());
        // out[65] is the reserved flag byte
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PoolKeyError> {
        if bytes.len() != POOL_KEY_LENGTH {
            return Err(PoolKeyError::InvalidLength(bytes.len()));
        }
        if bytes[65] != 0 {
            return Err(PoolKeyError::InvalidFlags(bytes[65]));
        }
        let fee = u32::from_be_bytes([0, bytes[40], bytes[41], bytes[42]]);
        let tick_spacing = i16::from_be_bytes([bytes[43], bytes[44]]);
        Ok(Self {
            currency0: Currency::new(Address::from_slice(&bytes[0..20])),
            currency1: Currency::new(Address::from_slice(&bytes[20..40])),
            fee,
            tick_spacing,
            hooks: Address::from_slice(&bytes[45..65]),
        })
    }

    pub fn id(&self) -> PoolId {
        keccak256(self.encode())
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} fee={} spacing={}",
            self.currency0, self.currency1, self.fee, self.tick_spacing
        )
    }
}

/// Tick spacing of a standard fee tier.
pub fn tick_spacing_for_fee(fee: u32) -> Option<i16> {
    FEE_TIERS
        .iter()
        .find(|(tier, _)| *tier == fee)
        .map(|(_, spacing)| *spacing)
}
