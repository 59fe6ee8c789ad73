//! Scenario execution and synthetic workloads over an in-memory host.

pub mod scenario;
pub mod stress_test;

use crate::core::pool_key::PoolKey;
use crate::core::state::StateDb;
use crate::pool::error::PoolError;
use crate::pool::manager::PoolManager;
use alloy_primitives::{Address, U256};

/// Settle what `caller` owes and take what it is owed in both currencies
/// of `key`, leaving its frame flat for those currencies.
pub fn net_out(
    manager: &mut PoolManager,
    host: &mut dyn StateDb,
    caller: Address,
    key: &PoolKey,
) -> Result<(), PoolError> {
    for currency in [key.currency0, key.currency1] {
        let delta = manager.get_delta(caller, currency);
        if delta > 0 {
            manager.settle(host, currency, U256::from(delta.unsigned_abs()))?;
        } else if delta < 0 {
            manager.take(host, currency, caller, U256::from(delta.unsigned_abs()))?;
        }
    }
    Ok(())
}
