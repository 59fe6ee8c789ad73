use crate::core::currency::Currency;
use crate::core::delta::BalanceDelta;
use crate::core::ledger::{FlashLedger, LockFrame};
use crate::core::pool_key::{PoolId, PoolKey};
use crate::core::state::{Journal, StateDb};
use crate::core::vault::{self, VaultError};
use crate::math::full_math::mul_div_rounding_up;
use crate::math::swap_math::FEE_DENOMINATOR;
use crate::math::{to_i128, MathError};
use crate::pool::error::PoolError;
use crate::pool::params::{FlashParams, ModifyLiquidityParams, SwapParams};
use crate::pool::position::{Position, PositionKey};
use crate::pool::state::{Pool, SwapResult};
use alloy_primitives::{address, Address, B256, U256};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Default custody account of the pool manager.
pub const POOL_MANAGER_ADDRESS: Address = address!("0000000000000000000000000000000000009010");

/// Original state of every pool touched inside one lock frame, `None` for
/// pools the frame created.
type Checkpoint = HashMap<PoolId, Option<Pool>>;

/// Singleton owner of every pool, with flash accounting.
///
/// Pool operations only run inside [`PoolManager::lock`]. Each operation
/// books what the caller owes or is owed into the caller's frame; the frame
/// must net to zero in every currency before the lock releases, otherwise
/// all pool changes and host writes made under it are discarded.
///
/// # Examples
///
/// ```
/// use dex_engine::core::currency::Currency;
/// use dex_engine::core::pool_key::PoolKey;
/// use dex_engine::core::state::MemoryState;
/// use dex_engine::math::Q96;
/// use dex_engine::pool::manager::PoolManager;
/// use alloy_primitives::Address;
///
/// let mut host = MemoryState::new();
/// let mut manager = PoolManager::new();
/// let key = PoolKey::sorted(
///     Currency::new(Address::with_last_byte(1)),
///     Currency::new(Address::with_last_byte(2)),
///     3000,
///     60,
/// );
/// assert_eq!(manager.initialize(key, Q96).unwrap(), 0);
///
/// // an empty lock settles trivially
/// let caller = Address::with_last_byte(0xca);
/// manager.lock(&mut host, caller, |_, _| Ok(())).unwrap();
/// assert!(!manager.is_locked());
/// ```
#[derive(Debug, Clone)]
pub struct PoolManager {
    address: Address,
    pools: HashMap<PoolId, Pool>,
    ledger: FlashLedger,
    checkpoints: Vec<Checkpoint>,
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::with_address(POOL_MANAGER_ADDRESS)
    }
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            pools: HashMap::new(),
            ledger: FlashLedger::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Custody account holding every pool's reserves.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Run `op` inside a new lock frame owned by `caller`.
    ///
    /// `op` sees the host through a journal. If `op` fails, or leaves any
    /// nonzero delta in its frame, the pools are restored to their state
    /// when the frame opened and the journal is dropped.
    pub fn lock<T, F>(
        &mut self,
        host: &mut dyn StateDb,
        caller: Address,
        op: F,
    ) -> Result<T, PoolError>
    where
        F: FnOnce(&mut PoolManager, &mut dyn StateDb) -> Result<T, PoolError>,
    {
        let depth = self.ledger.push(caller);
        self.checkpoints.push(Checkpoint::new());
        debug!("lock opened by {} at depth {}", caller, depth);

        let mut journal = Journal::new(host);
        let result = op(self, &mut journal);

        let frame = self.ledger.pop().unwrap_or_else(|| LockFrame::new(caller));
        let checkpoint = self.checkpoints.pop().unwrap_or_default();
        let outcome = result.and_then(|value| {
            if frame.is_settled() {
                return Ok(value);
            }
            match frame.outstanding().first() {
                Some(&(currency, delta)) => Err(PoolError::CurrencyNotSettled { currency, delta }),
                None => Err(PoolError::LockReverted),
            }
        });

        match outcome {
            Ok(value) => {
                journal.commit();
                if let Some(parent) = self.checkpoints.last_mut() {
                    for (id, original) in checkpoint {
                        parent.entry(id).or_insert(original);
                    }
                }
                debug!("lock released by {} at depth {}", caller, depth);
                Ok(value)
            }
            Err(err) => {
                drop(journal);
                for (id, original) in checkpoint {
                    match original {
                        Some(pool) => {
                            self.pools.insert(id, pool);
                        }
                        None => {
                            self.pools.remove(&id);
                        }
                    }
                }
                warn!("lock by {} at depth {} reverted: {}", caller, depth, err);
                Err(err)
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.ledger.is_locked()
    }

    pub fn lock_depth(&self) -> usize {
        self.ledger.depth()
    }

    fn caller(&self) -> Result<Address, PoolError> {
        self.ledger.current_caller().ok_or(PoolError::Unauthorized)
    }

    /// Mutable access to a pool, checkpointing it in the open frame first.
    fn pool_mut(&mut self, id: &PoolId) -> Result<&mut Pool, PoolError> {
        let original = self.pools.get(id).ok_or(PoolError::PoolNotInitialized(*id))?;
        if let Some(checkpoint) = self.checkpoints.last_mut() {
            checkpoint.entry(*id).or_insert_with(|| Some(original.clone()));
        }
        self.pools.get_mut(id).ok_or(PoolError::PoolNotInitialized(*id))
    }

    fn account(&mut self, currency: Currency, amount: i128) -> Result<(), PoolError> {
        if amount == 0 {
            return Ok(());
        }
        if !self.ledger.is_locked() {
            return Err(PoolError::Unauthorized);
        }
        self.ledger
            .apply(currency, amount)
            .map(|_| ())
            .ok_or(PoolError::Math(MathError::Overflow))
    }

    fn account_pool_delta(&mut self, key: &PoolKey, delta: BalanceDelta) -> Result<(), PoolError> {
        // both currencies must fit before either is booked
        let current0 = self.ledger.current().map_or(0, |f| f.delta(&key.currency0));
        let current1 = self.ledger.current().map_or(0, |f| f.delta(&key.currency1));
        if current0.checked_add(delta.amount0).is_none()
            || current1.checked_add(delta.amount1).is_none()
        {
            return Err(PoolError::Math(MathError::Overflow));
        }
        self.account(key.currency0, delta.amount0)?;
        self.account(key.currency1, delta.amount1)
    }

    /// Book the delta of a pool change that already happened. On failure the
    /// frame is reverted, so the lock restores the pool from its checkpoint.
    fn book_pool_change(&mut self, key: &PoolKey, delta: BalanceDelta) -> Result<(), PoolError> {
        self.account_pool_delta(key, delta).map_err(|err| {
            warn!("reverting frame: pool {} change could not be booked", key.id());
            self.ledger.revert_current();
            err
        })
    }

    /// Create a pool at `sqrt_price_x96` and return its starting tick.
    pub fn initialize(&mut self, key: PoolKey, sqrt_price_x96: U256) -> Result<i32, PoolError> {
        let id = key.id();
        if self.pools.contains_key(&id) {
            return Err(PoolError::PoolAlreadyInitialized(id));
        }
        let pool = Pool::new(key, sqrt_price_x96)?;
        let tick = pool.tick();
        if let Some(checkpoint) = self.checkpoints.last_mut() {
            checkpoint.entry(id).or_insert(None);
        }
        self.pools.insert(id, pool);
        info!("initialized pool {} ({}) at tick {}", id, key, tick);
        Ok(tick)
    }

    pub fn swap(&mut self, key: &PoolKey, params: &SwapParams) -> Result<BalanceDelta, PoolError> {
        self.swap_detailed(key, params).map(|result| result.delta)
    }

    /// Like [`PoolManager::swap`], also reporting the pool's final state.
    pub fn swap_detailed(
        &mut self,
        key: &PoolKey,
        params: &SwapParams,
    ) -> Result<SwapResult, PoolError> {
        self.caller()?;
        let result = self.pool_mut(&key.id())?.swap(params)?;
        self.book_pool_change(key, result.delta)?;
        Ok(result)
    }

    /// Change the caller's liquidity in a pool. Returns
    /// `(caller_delta, fees_accrued)` where the caller delta already
    /// includes the fees.
    pub fn modify_liquidity(
        &mut self,
        key: &PoolKey,
        params: &ModifyLiquidityParams,
    ) -> Result<(BalanceDelta, BalanceDelta), PoolError> {
        let caller = self.caller()?;
        let (principal, fees) = self.pool_mut(&key.id())?.modify_liquidity(caller, params)?;
        let delta = match principal.checked_add(fees) {
            Some(delta) => delta,
            None => {
                self.ledger.revert_current();
                return Err(PoolError::Math(MathError::Overflow));
            }
        };
        self.book_pool_change(key, delta)?;
        Ok((delta, fees))
    }

    /// Donate to a pool's in-range liquidity.
    pub fn donate(
        &mut self,
        key: &PoolKey,
        amount0: U256,
        amount1: U256,
    ) -> Result<BalanceDelta, PoolError> {
        self.caller()?;
        let id = key.id();
        let delta = BalanceDelta::new(to_i128(amount0)?, to_i128(amount1)?);
        let pool = self.pools.get(&id).ok_or(PoolError::PoolNotInitialized(id))?;
        if pool.liquidity() == 0 {
            return Err(PoolError::NoLiquidityToReceiveFees);
        }
        self.account_pool_delta(key, delta)?;
        self.pool_mut(&id)?.donate(amount0, amount1)?;
        debug!("donate {} to {}", delta, id);
        Ok(delta)
    }

    /// Lend pool reserves to `params.recipient` for the rest of the lock.
    ///
    /// Books `amount + fee` owed by the caller in each currency, where
    /// `fee = ceil(amount * pool_fee / 1e6)`, and credits the fee to
    /// in-range liquidity. A pool with no in-range liquidity lends for free.
    pub fn flash(
        &mut self,
        host: &mut dyn StateDb,
        key: &PoolKey,
        params: &FlashParams,
    ) -> Result<BalanceDelta, PoolError> {
        self.caller()?;
        let id = key.id();
        let pool = self.pools.get(&id).ok_or(PoolError::PoolNotInitialized(id))?;
        let fee_rate = if pool.liquidity() == 0 {
            U256::ZERO
        } else {
            U256::from(key.fee)
        };
        let denominator = U256::from(FEE_DENOMINATOR);
        let fee0 = mul_div_rounding_up(params.amount0, fee_rate, denominator)?;
        let fee1 = mul_div_rounding_up(params.amount1, fee_rate, denominator)?;
        let owed = BalanceDelta::new(
            to_i128(params.amount0.checked_add(fee0).ok_or(MathError::Overflow)?)?,
            to_i128(params.amount1.checked_add(fee1).ok_or(MathError::Overflow)?)?,
        );

        let loans = [
            (key.currency0, params.amount0),
            (key.currency1, params.amount1),
        ];
        for (currency, amount) in loans {
            let available = vault::balance_of(host, currency, self.address);
            if available < amount {
                return Err(PoolError::Vault(VaultError::InsufficientBalance {
                    currency,
                    account: self.address,
                    needed: amount,
                    available,
                }));
            }
        }

        self.account_pool_delta(key, owed)?;
        vault::transfer(host, key.currency0, self.address, params.recipient, params.amount0)?;
        vault::transfer(host, key.currency1, self.address, params.recipient, params.amount1)?;
        self.pool_mut(&id)?.distribute_fees(fee0, fee1)?;
        debug!(
            "flash {}/{} to {} owes {}",
            params.amount0, params.amount1, params.recipient, owed
        );
        Ok(owed)
    }

    /// Pay `amount` of `currency` from the caller to the manager, reducing
    /// what the caller owes. Returns the caller's remaining delta.
    pub fn settle(
        &mut self,
        host: &mut dyn StateDb,
        currency: Currency,
        amount: U256,
    ) -> Result<i128, PoolError> {
        let caller = self.caller()?;
        let signed = to_i128(amount)?;
        let remaining = self
            .ledger
            .delta(caller, &currency)
            .checked_sub(signed)
            .ok_or(PoolError::Math(MathError::Overflow))?;
        vault::transfer(host, currency, caller, self.address, amount)?;
        self.account(currency, -signed)?;
        debug!("settle {} {} by {}, remaining {}", amount, currency, caller, remaining);
        Ok(remaining)
    }

    /// Pay `amount` of `currency` from the manager to `recipient`,
    /// increasing what the caller owes. Returns the caller's new delta.
    pub fn take(
        &mut self,
        host: &mut dyn StateDb,
        currency: Currency,
        recipient: Address,
        amount: U256,
    ) -> Result<i128, PoolError> {
        let caller = self.caller()?;
        let signed = to_i128(amount)?;
        let next = self
            .ledger
            .delta(caller, &currency)
            .checked_add(signed)
            .ok_or(PoolError::Math(MathError::Overflow))?;
        vault::transfer(host, currency, self.address, recipient, amount)?;
        self.account(currency, signed)?;
        debug!("take {} {} to {}, delta {}", amount, currency, recipient, next);
        Ok(next)
    }

    pub fn get_pool(&self, key: &PoolKey) -> Option<&Pool> {
        self.pools.get(&key.id())
    }

    pub fn pools(&self) -> impl Iterator<Item = (&PoolId, &Pool)> {
        self.pools.iter()
    }

    pub fn get_position(
        &self,
        key: &PoolKey,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        salt: B256,
    ) -> Option<&Position> {
        self.get_pool(key)?
            .position(&PositionKey::new(owner, tick_lower, tick_upper, salt))
    }

    /// Delta of `caller`'s innermost open frame.
    pub fn get_delta(&self, caller: Address, currency: Currency) -> i128 {
        self.ledger.delta(caller, &currency)
    }

    /// Current sqrt price of a pool, for use as a price oracle.
    pub fn pool_price(&self, key: &PoolKey) -> Option<U256> {
        self.get_pool(key).map(Pool::sqrt_price_x96)
    }
}
