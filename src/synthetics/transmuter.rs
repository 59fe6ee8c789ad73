use crate::core::currency::Currency;
use crate::core::state::StateDb;
use crate::core::vault::{self, VaultError};
use crate::math::full_math::mul_div;
use crate::math::{MathError, Q96};
use alloy_primitives::{address, Address, U256};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Default custody account of the transmuter.
pub const TRANSMUTER_ADDRESS: Address = address!("0000000000000000000000000000000000009012");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmuterError {
    #[error("transmuter for {0} already initialized")]
    AlreadyInitialized(Address),

    #[error("transmuter for {0} not initialized")]
    NotInitialized(Address),

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("{owner} has no stake in {synthetic}")]
    NoStake { owner: Address, synthetic: Address },

    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Conversion state of one synthetic token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmuterState {
    pub synthetic: Address,
    pub underlying: Currency,
    /// Underlying paid per staked unit since inception, Q96.
    pub exchange_rate: U256,
    /// Underlying deposited and not yet claimed.
    pub exchange_buffer: U256,
    pub total_staked: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmuterStake {
    pub owner: Address,
    pub synthetic: Address,
    pub staked_amount: U256,
    pub unclaimed_amount: U256,
    pub last_update_index: U256,
}

/// Convert the part of a stake earned since its last snapshot.
///
/// Earned underlying moves into `unclaimed_amount` and consumes the same
/// quantity of staked principal.
pub fn reconcile(
    stake: &TransmuterStake,
    exchange_rate: U256,
) -> Result<TransmuterStake, MathError> {
    let mut next = stake.clone();
    if stake.staked_amount.is_zero() || exchange_rate <= stake.last_update_index {
        return Ok(next);
    }
    let earned = mul_div(
        stake.staked_amount,
        exchange_rate - stake.last_update_index,
        Q96,
    )?;
    next.unclaimed_amount = stake
        .unclaimed_amount
        .checked_add(earned)
        .ok_or(MathError::Overflow)?;
    next.staked_amount = stake.staked_amount.saturating_sub(earned);
    next.last_update_index = exchange_rate;
    Ok(next)
}

/// Pro-rata converter from staked synthetic tokens to their underlying.
///
/// Deposits raise a per-share index in O(1); each stake converts lazily
/// against the index whenever its owner touches it.
#[derive(Debug, Clone)]
pub struct Transmuter {
    address: Address,
    states: HashMap<Address, TransmuterState>,
    stakes: HashMap<(Address, Address), TransmuterStake>,
}

impl Default for Transmuter {
    fn default() -> Self {
        Self::with_address(TRANSMUTER_ADDRESS)
    }
}

impl Transmuter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            states: HashMap::new(),
            stakes: HashMap::new(),
        }
    }

    /// Custody account holding staked synthetics and claimable underlying.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn initialize_transmuter(
        &mut self,
        synthetic: Address,
        underlying: Currency,
    ) -> Result<(), TransmuterError> {
        if self.states.contains_key(&synthetic) {
            return Err(TransmuterError::AlreadyInitialized(synthetic));
        }
        self.states.insert(
            synthetic,
            TransmuterState {
                synthetic,
                underlying,
                exchange_rate: Q96,
                exchange_buffer: U256::ZERO,
                total_staked: U256::ZERO,
            },
        );
        info!("initialized transmuter for {} -> {}", synthetic, underlying);
        Ok(())
    }

    /// Book `amount` of underlying as claimable by current stakers.
    ///
    /// Funding the custody account is the depositor's concern; a zero
    /// amount is a no-op.
    pub fn deposit(&mut self, synthetic: Address, amount: U256) -> Result<(), TransmuterError> {
        let state = self
            .states
            .get(&synthetic)
            .ok_or(TransmuterError::NotInitialized(synthetic))?;
        if amount.is_zero() {
            return Ok(());
        }
        let buffer = state
            .exchange_buffer
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        let rate = if state.total_staked.is_zero() {
            state.exchange_rate
        } else {
            state
                .exchange_rate
                .checked_add(mul_div(amount, Q96, state.total_staked)?)
                .ok_or(MathError::Overflow)?
        };

        if let Some(state) = self.states.get_mut(&synthetic) {
            state.exchange_buffer = buffer;
            state.exchange_rate = rate;
        }
        debug!("transmuter {} deposit {}, rate {}", synthetic, amount, rate);
        Ok(())
    }

    pub fn stake(
        &mut self,
        host: &mut dyn StateDb,
        owner: Address,
        synthetic: Address,
        amount: U256,
    ) -> Result<(), TransmuterError> {
        let state = self
            .states
            .get(&synthetic)
            .ok_or(TransmuterError::NotInitialized(synthetic))?;
        if amount.is_zero() {
            return Err(TransmuterError::InvalidAmount);
        }
        let rate = state.exchange_rate;
        let total = state
            .total_staked
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;

        let current = self
            .stakes
            .get(&(owner, synthetic))
            .cloned()
            .unwrap_or(TransmuterStake {
                owner,
                synthetic,
                staked_amount: U256::ZERO,
                unclaimed_amount: U256::ZERO,
                last_update_index: rate,
            });
        let mut next = reconcile(&current, rate)?;
        next.staked_amount = next
            .staked_amount
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        next.last_update_index = rate;

        vault::transfer(host, Currency::new(synthetic), owner, self.address, amount)?;
        self.stakes.insert((owner, synthetic), next);
        if let Some(state) = self.states.get_mut(&synthetic) {
            state.total_staked = total;
        }
        debug!("{} staked {} of {}", owner, amount, synthetic);
        Ok(())
    }

    /// Withdraw unconverted principal, clamped to what is still staked.
    /// Returns the amount returned.
    pub fn unstake(
        &mut self,
        host: &mut dyn StateDb,
        owner: Address,
        synthetic: Address,
        amount: U256,
    ) -> Result<U256, TransmuterError> {
        let state = self
            .states
            .get(&synthetic)
            .ok_or(TransmuterError::NotInitialized(synthetic))?;
        let current = self
            .stakes
            .get(&(owner, synthetic))
            .filter(|s| !s.staked_amount.is_zero())
            .ok_or(TransmuterError::NoStake { owner, synthetic })?;

        let mut next = reconcile(current, state.exchange_rate)?;
        let amount = amount.min(next.staked_amount);
        next.staked_amount -= amount;
        let total = state.total_staked.saturating_sub(amount);

        vault::transfer(host, Currency::new(synthetic), self.address, owner, amount)?;
        self.stakes.insert((owner, synthetic), next);
        if let Some(state) = self.states.get_mut(&synthetic) {
            state.total_staked = total;
        }
        debug!("{} unstaked {} of {}", owner, amount, synthetic);
        Ok(amount)
    }

    /// Pay out converted underlying, as much as the buffer holds.
    /// Returns the amount paid.
    pub fn claim(
        &mut self,
        host: &mut dyn StateDb,
        owner: Address,
        synthetic: Address,
    ) -> Result<U256, TransmuterError> {
        let state = self
            .states
            .get(&synthetic)
            .ok_or(TransmuterError::NotInitialized(synthetic))?;
        let current = self
            .stakes
            .get(&(owner, synthetic))
            .ok_or(TransmuterError::NoStake { owner, synthetic })?;

        let mut next = reconcile(current, state.exchange_rate)?;
        let payout = next.unclaimed_amount.min(state.exchange_buffer);
        next.unclaimed_amount -= payout;
        let buffer = state.exchange_buffer - payout;
        let underlying = state.underlying;

        vault::transfer(host, underlying, self.address, owner, payout)?;
        self.stakes.insert((owner, synthetic), next);
        if let Some(state) = self.states.get_mut(&synthetic) {
            state.exchange_buffer = buffer;
        }
        debug!("{} claimed {} {}", owner, payout, underlying);
        Ok(payout)
    }

    /// What [`Transmuter::claim`] would pay right now.
    pub fn get_claimable(&self, owner: Address, synthetic: Address) -> U256 {
        let (Some(state), Some(stake)) = (
            self.states.get(&synthetic),
            self.stakes.get(&(owner, synthetic)),
        ) else {
            return U256::ZERO;
        };
        let pending = match reconcile(stake, state.exchange_rate) {
            Ok(next) => next.unclaimed_amount,
            Err(_) => U256::MAX,
        };
        pending.min(state.exchange_buffer)
    }

    pub fn get_stake(&self, owner: Address, synthetic: Address) -> Option<&TransmuterStake> {
        self.stakes.get(&(owner, synthetic))
    }

    pub fn get_state(&self, synthetic: Address) -> Option<&TransmuterState> {
        self.states.get(&synthetic)
    }

    /// Current index, `Q96` for an unknown synthetic.
    pub fn get_exchange_rate(&self, synthetic: Address) -> U256 {
        self.states
            .get(&synthetic)
            .map_or(Q96, |state| state.exchange_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::MemoryState;

    const E18: u128 = 1_000_000_000_000_000_000;

    fn e18(n: u128) -> U256 {
        U256::from(n * E18)
    }

    fn synthetic() -> Address {
        Address::with_last_byte(0x51)
    }

    fn underlying() -> Currency {
        Currency::new(Address::with_last_byte(0x0d))
    }

    fn user(n: u8) -> Address {
        Address::with_last_byte(0xa0 + n)
    }

    fn setup() -> (MemoryState, Transmuter) {
        let mut host = MemoryState::new();
        let mut transmuter = Transmuter::new();
        transmuter
            .initialize_transmuter(synthetic(), underlying())
            .unwrap();
        for n in 1..=2 {
            vault::mint(&mut host, Currency::new(synthetic()), user(n), e18(1_000)).unwrap();
        }
        vault::mint(&mut host, underlying(), transmuter.address(), e18(1_000)).unwrap();
        (host, transmuter)
    }

    #[test]
    fn test_initialize_twice() {
        let (_, mut transmuter) = setup();
        assert_eq!(transmuter.get_exchange_rate(synthetic()), Q96);
        assert_eq!(
            transmuter.initialize_transmuter(synthetic(), underlying()),
            Err(TransmuterError::AlreadyInitialized(synthetic()))
        );
    }

    #[test]
    fn test_stake_moves_tokens() {
        let (mut host, mut transmuter) = setup();
        transmuter
            .stake(&mut host, user(1), synthetic(), e18(100))
            .unwrap();
        let stake = transmuter.get_stake(user(1), synthetic()).unwrap();
        assert_eq!(stake.staked_amount, e18(100));
        assert_eq!(transmuter.get_state(synthetic()).unwrap().total_staked, e18(100));
        assert_eq!(
            vault::balance_of(&host, Currency::new(synthetic()), transmuter.address()),
            e18(100)
        );
        assert_eq!(
            transmuter.stake(&mut host, user(1), synthetic(), U256::ZERO),
            Err(TransmuterError::InvalidAmount)
        );
    }

    #[test]
    fn test_deposit_and_claim() {
        let (mut host, mut transmuter) = setup();
        transmuter
            .stake(&mut host, user(1), synthetic(), e18(100))
            .unwrap();
        transmuter.deposit(synthetic(), e18(50)).unwrap();
        assert_eq!(transmuter.get_claimable(user(1), synthetic()), e18(50));

        let paid = transmuter.claim(&mut host, user(1), synthetic()).unwrap();
        assert_eq!(paid, e18(50));
        assert_eq!(vault::balance_of(&host, underlying(), user(1)), e18(50));
        let stake = transmuter.get_stake(user(1), synthetic()).unwrap();
        assert_eq!(stake.staked_amount, e18(50));
        assert_eq!(stake.unclaimed_amount, U256::ZERO);
        assert_eq!(transmuter.get_state(synthetic()).unwrap().exchange_buffer, U256::ZERO);
    }

    #[test]
    fn test_claim_with_nothing_pending() {
        let (mut host, mut transmuter) = setup();
        transmuter
            .stake(&mut host, user(1), synthetic(), e18(10))
            .unwrap();
        assert_eq!(transmuter.claim(&mut host, user(1), synthetic()), Ok(U256::ZERO));
        assert_eq!(
            transmuter.claim(&mut host, user(2), synthetic()),
            Err(TransmuterError::NoStake {
                owner: user(2),
                synthetic: synthetic()
            })
        );
    }

    #[test]
    fn test_unstake_is_clamped() {
        let (mut host, mut transmuter) = setup();
        transmuter
            .stake(&mut host, user(1), synthetic(), e18(100))
            .unwrap();
        let returned = transmuter
            .unstake(&mut host, user(1), synthetic(), e18(30))
            .unwrap();
        assert_eq!(returned, e18(30));
        let returned = transmuter
            .unstake(&mut host, user(1), synthetic(), e18(500))
            .unwrap();
        assert_eq!(returned, e18(70));
        assert_eq!(
            vault::balance_of(&host, Currency::new(synthetic()), user(1)),
            e18(1_000)
        );
        assert!(matches!(
            transmuter.unstake(&mut host, user(1), synthetic(), e18(1)),
            Err(TransmuterError::NoStake { .. })
        ));
    }

    #[test]
    fn test_pro_rata_split() {
        let (mut host, mut transmuter) = setup();
        transmuter
            .stake(&mut host, user(1), synthetic(), e18(100))
            .unwrap();
        transmuter
            .stake(&mut host, user(2), synthetic(), e18(200))
            .unwrap();
        transmuter.deposit(synthetic(), e18(150)).unwrap();
        assert_eq!(transmuter.get_claimable(user(1), synthetic()), e18(50));
        assert_eq!(transmuter.get_claimable(user(2), synthetic()), e18(100));
    }

    #[test]
    fn test_deposit_without_stakers_only_fills_buffer() {
        let (_, mut transmuter) = setup();
        transmuter.deposit(synthetic(), e18(10)).unwrap();
        let state = transmuter.get_state(synthetic()).unwrap();
        assert_eq!(state.exchange_rate, Q96);
        assert_eq!(state.exchange_buffer, e18(10));
        assert_eq!(
            transmuter.deposit(Address::ZERO, e18(1)),
            Err(TransmuterError::NotInitialized(Address::ZERO))
        );
    }

    #[test]
    fn test_underfunded_claim_changes_nothing() {
        let mut host = MemoryState::new();
        let mut transmuter = Transmuter::new();
        transmuter
            .initialize_transmuter(synthetic(), underlying())
            .unwrap();
        vault::mint(&mut host, Currency::new(synthetic()), user(1), e18(10)).unwrap();
        transmuter
            .stake(&mut host, user(1), synthetic(), e18(10))
            .unwrap();
        transmuter.deposit(synthetic(), e18(5)).unwrap();

        let before = transmuter.get_stake(user(1), synthetic()).cloned();
        let err = transmuter.claim(&mut host, user(1), synthetic()).unwrap_err();
        assert!(matches!(err, TransmuterError::Vault(_)));
        assert_eq!(transmuter.get_stake(user(1), synthetic()).cloned(), before);
        assert_eq!(transmuter.get_claimable(user(1), synthetic()), e18(5));
    }

    #[test]
    fn test_reconcile_consumes_principal() {
        let stake = TransmuterStake {
            owner: user(1),
            synthetic: synthetic(),
            staked_amount: U256::from(10u8),
            unclaimed_amount: U256::ZERO,
            last_update_index: Q96,
        };
        // index tripled: 20 earned against 10 staked
        let next = reconcile(&stake, Q96 * U256::from(3u8)).unwrap();
        assert_eq!(next.unclaimed_amount, U256::from(20u8));
        assert_eq!(next.staked_amount, U256::ZERO);
        assert_eq!(reconcile(&stake, Q96).unwrap(), stake);
    }
}
