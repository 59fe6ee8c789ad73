use crate::core::currency::Currency;
use crate::core::pool_key::{PoolId, PoolKey};
use crate::core::state::StateDb;
use crate::core::vault::{self, VaultError};
use crate::math::full_math::{div_rounding_up, mul_div, mul_div_rounding_up};
use crate::math::{MathError, Q96};
use crate::pool::manager::PoolManager;
use crate::synthetics::transmuter::{Transmuter, TransmuterError};
use alloy_primitives::{address, Address, U256};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum loan-to-value, in units of [`LTV_PRECISION`].
pub const MAX_LTV: u64 = 90;
pub const LTV_PRECISION: u64 = 100;

/// Fee withheld from every burn, in units of [`BURN_FEE_PRECISION`].
pub const BURN_FEE: u64 = 10;
pub const BURN_FEE_PRECISION: u64 = 1_000_000;

/// Fixed-point unit of `yield_per_block`.
pub const YIELD_PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Default custody account of the alchemist.
pub const ALCHEMIST_ADDRESS: Address = address!("0000000000000000000000000000000000009011");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlchemistError {
    #[error("yield token {0} already registered")]
    YieldTokenAlreadyRegistered(Address),

    #[error("synthetic token {0} already registered")]
    SyntheticAlreadyRegistered(Address),

    #[error("yield token {0} not registered")]
    YieldTokenNotFound(Address),

    #[error("synthetic token {0} not registered")]
    SyntheticNotFound(Address),

    #[error("yield token {0} is not accepting deposits")]
    YieldTokenInactive(Address),

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("debt {debt} would exceed max LTV of collateral worth {collateral_value}")]
    MaxLtvExceeded { debt: U256, collateral_value: U256 },

    #[error("debt ceiling of {synthetic} exceeded: {requested} > {ceiling}")]
    DebtCeilingExceeded {
        synthetic: Address,
        requested: U256,
        ceiling: U256,
    },

    #[error("insufficient collateral: have {available}, need {needed}")]
    InsufficientCollateral { available: U256, needed: U256 },

    #[error("account has no debt to repay")]
    NothingToRepay,

    #[error("account debt is denominated in {bound}, not {requested}")]
    SyntheticMismatch { bound: Address, requested: Address },

    #[error("pool {0} does not price yield token {1}")]
    InvalidOracle(PoolId, Address),

    #[error("oracle pool {0} is not initialized")]
    OraclePoolNotInitialized(PoolId),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Transmuter(#[from] TransmuterError),
}

/// Collateral asset accepted by the alchemist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldToken {
    pub token: Address,
    pub underlying: Currency,
    /// Yield per unit of collateral per block, scaled by [`YIELD_PRECISION`].
    pub yield_per_block: U256,
    pub total_deposited: U256,
    pub active: bool,
    /// Pool pricing the token in its underlying. Without one, collateral is
    /// valued at par.
    pub oracle: Option<PoolKey>,
}

/// Debt asset issued by the alchemist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticToken {
    pub token: Address,
    pub underlying: Currency,
    pub debt_ceiling: U256,
    pub total_debt: U256,
}

/// A collateralized debt position of one owner in one yield token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: Address,
    pub yield_token: Address,
    pub collateral: U256,
    pub debt: U256,
    pub last_harvest_block: u64,
    /// Synthetic the debt is denominated in, bound on first mint.
    pub synthetic: Option<Address>,
}

impl Account {
    fn empty(owner: Address, yield_token: Address, block: u64) -> Self {
        Self {
            owner,
            yield_token,
            collateral: U256::ZERO,
            debt: U256::ZERO,
            last_harvest_block: block,
            synthetic: None,
        }
    }
}

/// Apply the yield earned since the last harvest to an account's debt.
///
/// Returns the advanced account and the amount of debt repaid. Yield beyond
/// the outstanding debt is not carried over.
pub fn accrue(account: &Account, yield_per_block: U256, current_block: u64) -> (Account, U256) {
    let mut next = account.clone();
    let elapsed = current_block.saturating_sub(account.last_harvest_block);
    next.last_harvest_block = account.last_harvest_block.max(current_block);
    if elapsed == 0 || account.debt.is_zero() {
        return (next, U256::ZERO);
    }
    let rate = yield_per_block.saturating_mul(U256::from(elapsed));
    let accrued = mul_div(account.collateral, rate, YIELD_PRECISION).unwrap_or(U256::MAX);
    let repaid = accrued.min(account.debt);
    next.debt = account.debt - repaid;
    (next, repaid)
}

fn exceeds_max_ltv(debt: U256, collateral_value: U256) -> bool {
    debt.saturating_mul(U256::from(LTV_PRECISION))
        > collateral_value.saturating_mul(U256::from(MAX_LTV))
}

/// Synthetic debt issuer backed by yield-bearing collateral.
///
/// Every mutating call first harvests the account's yield into debt
/// repayment, then validates, then moves tokens, and only then writes its
/// own maps, so a rejected call leaves no trace. Repaid debt is queued per
/// synthetic until [`Alchemist::flush_yield`] hands it to the transmuter.
#[derive(Debug, Clone)]
pub struct Alchemist {
    address: Address,
    yield_tokens: HashMap<Address, YieldToken>,
    synthetics: HashMap<Address, SyntheticToken>,
    accounts: HashMap<(Address, Address), Account>,
    pending_yield: HashMap<Address, U256>,
}

impl Default for Alchemist {
    fn default() -> Self {
        Self::with_address(ALCHEMIST_ADDRESS)
    }
}

impl Alchemist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            yield_tokens: HashMap::new(),
            synthetics: HashMap::new(),
            accounts: HashMap::new(),
            pending_yield: HashMap::new(),
        }
    }

    /// Custody account holding deposited collateral.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn add_yield_token(
        &mut self,
        token: Address,
        underlying: Currency,
        yield_per_block: U256,
    ) -> Result<(), AlchemistError> {
        if self.yield_tokens.contains_key(&token) {
            return Err(AlchemistError::YieldTokenAlreadyRegistered(token));
        }
        self.yield_tokens.insert(
            token,
            YieldToken {
                token,
                underlying,
                yield_per_block,
                total_deposited: U256::ZERO,
                active: true,
                oracle: None,
            },
        );
        info!(
            "registered yield token {} over {} at {} per block",
            token, underlying, yield_per_block
        );
        Ok(())
    }

    pub fn add_synthetic_token(
        &mut self,
        token: Address,
        underlying: Currency,
        debt_ceiling: U256,
    ) -> Result<(), AlchemistError> {
        if self.synthetics.contains_key(&token) {
            return Err(AlchemistError::SyntheticAlreadyRegistered(token));
        }
        self.synthetics.insert(
            token,
            SyntheticToken {
                token,
                underlying,
                debt_ceiling,
                total_debt: U256::ZERO,
            },
        );
        info!(
            "registered synthetic {} over {} with ceiling {}",
            token, underlying, debt_ceiling
        );
        Ok(())
    }

    /// Open or close a yield token to new deposits.
    pub fn set_yield_token_active(
        &mut self,
        token: Address,
        active: bool,
    ) -> Result<(), AlchemistError> {
        let yield_token = self
            .yield_tokens
            .get_mut(&token)
            .ok_or(AlchemistError::YieldTokenNotFound(token))?;
        yield_token.active = active;
        info!("yield token {} active: {}", token, active);
        Ok(())
    }

    /// Value a yield token's collateral through a pool's price.
    pub fn set_price_oracle(&mut self, token: Address, key: PoolKey) -> Result<(), AlchemistError> {
        let yield_token = self
            .yield_tokens
            .get_mut(&token)
            .ok_or(AlchemistError::YieldTokenNotFound(token))?;
        if key.currency0.address() != token && key.currency1.address() != token {
            return Err(AlchemistError::InvalidOracle(key.id(), token));
        }
        yield_token.oracle = Some(key);
        info!("yield token {} priced by pool {}", token, key.id());
        Ok(())
    }

    fn yield_token(&self, token: Address) -> Result<&YieldToken, AlchemistError> {
        self.yield_tokens
            .get(&token)
            .ok_or(AlchemistError::YieldTokenNotFound(token))
    }

    /// The account as it would stand after harvesting at `block`, with the
    /// debt repaid by the harvest.
    fn harvested(
        &self,
        owner: Address,
        yield_token: &YieldToken,
        block: u64,
    ) -> (Account, U256) {
        match self.accounts.get(&(owner, yield_token.token)) {
            Some(account) => accrue(account, yield_token.yield_per_block, block),
            None => (Account::empty(owner, yield_token.token, block), U256::ZERO),
        }
    }

    /// Write back an account and book the debt its harvest repaid.
    fn store(&mut self, account: Account, repaid: U256) {
        if let (Some(synthetic), false) = (account.synthetic, repaid.is_zero()) {
            if let Some(token) = self.synthetics.get_mut(&synthetic) {
                token.total_debt = token.total_debt.saturating_sub(repaid);
            }
            let pending = self.pending_yield.entry(synthetic).or_default();
            *pending = pending.saturating_add(repaid);
            debug!("harvest repaid {} of {} for {}", repaid, synthetic, account.owner);
        }
        self.accounts
            .insert((account.owner, account.yield_token), account);
    }

    /// Collateral value in the underlying, through the oracle pool if set.
    fn collateral_value(
        &self,
        pool_manager: &PoolManager,
        yield_token: &YieldToken,
        amount: U256,
    ) -> Result<U256, AlchemistError> {
        let Some(key) = yield_token.oracle else {
            return Ok(amount);
        };
        let sqrt_price = pool_manager
            .pool_price(&key)
            .ok_or(AlchemistError::OraclePoolNotInitialized(key.id()))?;
        let value = if key.currency0.address() == yield_token.token {
            mul_div(mul_div(amount, sqrt_price, Q96)?, sqrt_price, Q96)?
        } else {
            mul_div(mul_div(amount, Q96, sqrt_price)?, Q96, sqrt_price)?
        };
        Ok(value)
    }

    /// Add collateral.
    pub fn deposit(
        &mut self,
        host: &mut dyn StateDb,
        owner: Address,
        yield_token: Address,
        amount: U256,
    ) -> Result<(), AlchemistError> {
        let token = self.yield_token(yield_token)?;
        if !token.active {
            return Err(AlchemistError::YieldTokenInactive(yield_token));
        }
        if amount.is_zero() {
            return Err(AlchemistError::ZeroAmount);
        }
        let (mut account, repaid) = self.harvested(owner, token, host.block_number());
        account.collateral = account
            .collateral
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        let total = token
            .total_deposited
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;

        vault::transfer(host, Currency::new(yield_token), owner, self.address, amount)?;
        self.store(account, repaid);
        if let Some(token) = self.yield_tokens.get_mut(&yield_token) {
            token.total_deposited = total;
        }
        debug!("{} deposited {} of {}", owner, amount, yield_token);
        Ok(())
    }

    /// Issue `amount` of `synthetic` against the account's collateral.
    pub fn mint(
        &mut self,
        host: &mut dyn StateDb,
        pool_manager: &PoolManager,
        owner: Address,
        yield_token: Address,
        synthetic: Address,
        amount: U256,
    ) -> Result<(), AlchemistError> {
        let token = self.yield_token(yield_token)?;
        let synth = self
            .synthetics
            .get(&synthetic)
            .ok_or(AlchemistError::SyntheticNotFound(synthetic))?;
        if amount.is_zero() {
            return Err(AlchemistError::ZeroAmount);
        }
        let (mut account, repaid) = self.harvested(owner, token, host.block_number());
        if let Some(bound) = account.synthetic {
            if bound != synthetic && !account.debt.is_zero() {
                return Err(AlchemistError::SyntheticMismatch {
                    bound,
                    requested: synthetic,
                });
            }
        }

        let debt = account.debt.checked_add(amount).ok_or(MathError::Overflow)?;
        let collateral_value = self.collateral_value(pool_manager, token, account.collateral)?;
        if exceeds_max_ltv(debt, collateral_value) {
            return Err(AlchemistError::MaxLtvExceeded {
                debt,
                collateral_value,
            });
        }

        // a harvest on this account lowers the same synthetic's total first
        let mut total_debt = synth.total_debt;
        if account.synthetic == Some(synthetic) {
            total_debt = total_debt.saturating_sub(repaid);
        }
        let requested = total_debt.checked_add(amount).ok_or(MathError::Overflow)?;
        if requested > synth.debt_ceiling {
            return Err(AlchemistError::DebtCeilingExceeded {
                synthetic,
                requested,
                ceiling: synth.debt_ceiling,
            });
        }

        vault::mint(host, Currency::new(synthetic), owner, amount)?;
        account.debt = debt;
        // the harvest is booked against the binding it accrued under
        self.store(account, repaid);
        if let Some(stored) = self.accounts.get_mut(&(owner, yield_token)) {
            stored.synthetic = Some(synthetic);
        }
        if let Some(synth) = self.synthetics.get_mut(&synthetic) {
            synth.total_debt = synth.total_debt.saturating_add(amount);
        }
        debug!("{} minted {} of {}", owner, amount, synthetic);
        Ok(())
    }

    /// Repay debt by burning synthetic tokens, less the burn fee.
    ///
    /// `amount` is clamped to what repays the whole debt. Returns the
    /// amount burned.
    pub fn burn(
        &mut self,
        host: &mut dyn StateDb,
        owner: Address,
        yield_token: Address,
        synthetic: Address,
        amount: U256,
    ) -> Result<U256, AlchemistError> {
        let token = self.yield_token(yield_token)?;
        if !self.synthetics.contains_key(&synthetic) {
            return Err(AlchemistError::SyntheticNotFound(synthetic));
        }
        if amount.is_zero() {
            return Err(AlchemistError::ZeroAmount);
        }
        let (mut account, repaid) = self.harvested(owner, token, host.block_number());
        if account.debt.is_zero() {
            return Err(AlchemistError::NothingToRepay);
        }
        if let Some(bound) = account.synthetic {
            if bound != synthetic {
                return Err(AlchemistError::SyntheticMismatch {
                    bound,
                    requested: synthetic,
                });
            }
        }

        let precision = U256::from(BURN_FEE_PRECISION);
        let full_repayment = mul_div_rounding_up(
            account.debt,
            precision,
            precision - U256::from(BURN_FEE),
        )?;
        let burned = amount.min(full_repayment);
        let fee = mul_div(burned, U256::from(BURN_FEE), precision)?;
        let reduction = (burned - fee).min(account.debt);

        vault::burn(host, Currency::new(synthetic), owner, burned)?;
        account.debt -= reduction;
        self.store(account, repaid);
        if let Some(synth) = self.synthetics.get_mut(&synthetic) {
            synth.total_debt = synth.total_debt.saturating_sub(reduction);
        }
        debug!(
            "{} burned {} of {}, debt reduced by {}",
            owner, burned, synthetic, reduction
        );
        Ok(burned)
    }

    /// Remove collateral, keeping the account within max LTV.
    pub fn withdraw(
        &mut self,
        host: &mut dyn StateDb,
        pool_manager: &PoolManager,
        owner: Address,
        yield_token: Address,
        amount: U256,
    ) -> Result<(), AlchemistError> {
        let token = self.yield_token(yield_token)?;
        if amount.is_zero() {
            return Err(AlchemistError::ZeroAmount);
        }
        let (mut account, repaid) = self.harvested(owner, token, host.block_number());
        if amount > account.collateral {
            return Err(AlchemistError::InsufficientCollateral {
                available: account.collateral,
                needed: amount,
            });
        }
        let remaining = account.collateral - amount;
        let collateral_value = self.collateral_value(pool_manager, token, remaining)?;
        if exceeds_max_ltv(account.debt, collateral_value) {
            return Err(AlchemistError::MaxLtvExceeded {
                debt: account.debt,
                collateral_value,
            });
        }
        let total = token.total_deposited.saturating_sub(amount);

        vault::transfer(host, Currency::new(yield_token), self.address, owner, amount)?;
        account.collateral = remaining;
        self.store(account, repaid);
        if let Some(token) = self.yield_tokens.get_mut(&yield_token) {
            token.total_deposited = total;
        }
        debug!("{} withdrew {} of {}", owner, amount, yield_token);
        Ok(())
    }

    /// Hand the harvested yield queued for `synthetic` to the transmuter.
    /// Returns the amount flushed.
    pub fn flush_yield(
        &mut self,
        transmuter: &mut Transmuter,
        synthetic: Address,
    ) -> Result<U256, AlchemistError> {
        let amount = self.pending_yield(synthetic);
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        transmuter.deposit(synthetic, amount)?;
        self.pending_yield.remove(&synthetic);
        info!("flushed {} of harvested yield for {}", amount, synthetic);
        Ok(amount)
    }

    /// The account as of the host's current block, harvest included.
    pub fn get_account(
        &self,
        host: &dyn StateDb,
        owner: Address,
        yield_token: Address,
    ) -> Option<Account> {
        let token = self.yield_tokens.get(&yield_token)?;
        let account = self.accounts.get(&(owner, yield_token))?;
        Some(accrue(account, token.yield_per_block, host.block_number()).0)
    }

    /// Debt as a percentage of collateral value. Zero without debt,
    /// `U256::MAX` for debt against worthless collateral.
    pub fn get_ltv(
        &self,
        host: &dyn StateDb,
        pool_manager: &PoolManager,
        owner: Address,
        yield_token: Address,
    ) -> Result<U256, AlchemistError> {
        let token = self.yield_token(yield_token)?;
        let Some(account) = self.get_account(host, owner, yield_token) else {
            return Ok(U256::ZERO);
        };
        if account.debt.is_zero() {
            return Ok(U256::ZERO);
        }
        let value = self.collateral_value(pool_manager, token, account.collateral)?;
        if value.is_zero() {
            return Ok(U256::MAX);
        }
        Ok(mul_div(account.debt, U256::from(LTV_PRECISION), value)?)
    }

    /// Additional debt the account could take on at max LTV.
    pub fn get_max_mintable(
        &self,
        host: &dyn StateDb,
        pool_manager: &PoolManager,
        owner: Address,
        yield_token: Address,
    ) -> Result<U256, AlchemistError> {
        let token = self.yield_token(yield_token)?;
        let Some(account) = self.get_account(host, owner, yield_token) else {
            return Ok(U256::ZERO);
        };
        let value = self.collateral_value(pool_manager, token, account.collateral)?;
        let limit = mul_div(value, U256::from(MAX_LTV), U256::from(LTV_PRECISION))?;
        Ok(limit.saturating_sub(account.debt))
    }

    /// Blocks until yield repays the current debt, `None` when the account
    /// earns nothing.
    pub fn get_time_to_repayment(
        &self,
        host: &dyn StateDb,
        owner: Address,
        yield_token: Address,
    ) -> Option<u64> {
        let token = self.yield_tokens.get(&yield_token)?;
        let account = self.get_account(host, owner, yield_token)?;
        if account.debt.is_zero() {
            return Some(0);
        }
        let per_block = mul_div(account.collateral, token.yield_per_block, YIELD_PRECISION).ok()?;
        if per_block.is_zero() {
            return None;
        }
        let blocks = div_rounding_up(account.debt, per_block).ok()?;
        if blocks > U256::from(u64::MAX) {
            return Some(u64::MAX);
        }
        Some(blocks.to::<u64>())
    }

    /// Harvested yield waiting to be flushed to the transmuter.
    pub fn pending_yield(&self, synthetic: Address) -> U256 {
        self.pending_yield
            .get(&synthetic)
            .copied()
            .unwrap_or_default()
    }

    pub fn get_yield_token(&self, token: Address) -> Option<&YieldToken> {
        self.yield_tokens.get(&token)
    }

    pub fn get_synthetic(&self, token: Address) -> Option<&SyntheticToken> {
        self.synthetics.get(&token)
    }
}
