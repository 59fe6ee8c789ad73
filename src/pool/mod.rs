//! Concentrated-liquidity pools and the singleton [`manager::PoolManager`]
//! that owns them.

pub mod error;
pub mod manager;
pub mod params;
pub mod position;
pub mod state;
pub mod tick;

pub use error::PoolError;
pub use manager::PoolManager;
pub use params::{FlashParams, ModifyLiquidityParams, SwapParams};
pub use state::{Pool, SwapResult};
