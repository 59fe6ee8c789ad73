//! # dex-engine
//!
//! Stateful core of an embedded exchange: concentrated-liquidity pools with
//! flash accounting, a synthetic debt issuer, and a transmuter converting
//! synthetics back into their underlying.
//!
//! Every operation is synchronous and runs against a host implementing
//! [`core::state::StateDb`]. A call either commits all of its effects or
//! none of them.
//!
//! ## Architecture
//!
//! - **math**: Q64.96 price math, tick math, swap steps
//! - **core**: Currencies, pool keys, balance deltas, the flash ledger, host state and token vault
//! - **pool**: Ticks, positions, pool state and the singleton pool manager
//! - **synthetics**: Alchemist (collateralized debt) and Transmuter (pro-rata conversion)
//! - **simulation**: JSON scenarios and random swap workloads

pub mod core;
pub mod math;
pub mod pool;
pub mod simulation;
pub mod synthetics;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::currency::Currency;
    pub use crate::core::delta::BalanceDelta;
    pub use crate::core::pool_key::{PoolId, PoolKey};
    pub use crate::core::state::{MemoryState, StateDb};
    pub use crate::pool::manager::PoolManager;
    pub use crate::pool::params::{FlashParams, ModifyLiquidityParams, SwapParams};
    pub use crate::synthetics::alchemist::Alchemist;
    pub use crate::synthetics::transmuter::Transmuter;
}
