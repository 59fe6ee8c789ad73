//! Currency movements against host state.
//!
//! Native balances are the host's account balances. A token's balances live
//! in the token contract's storage at `keccak256(pad32(account) | pad32(0))`,
//! the layout of a mapping declared in the contract's first slot.

use crate::core::currency::Currency;
use crate::core::state::StateDb;
use alloy_primitives::{keccak256, Address, B256, U256};
use log::trace;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("{account} holds {available} of {currency}, needs {needed}")]
    InsufficientBalance {
        currency: Currency,
        account: Address,
        needed: U256,
        available: U256,
    },
    #[error("balance of {account} in {currency} would overflow")]
    BalanceOverflow { currency: Currency, account: Address },
}

/// Storage slot holding `account`'s balance inside a token contract.
pub fn balance_slot(account: Address) -> B256 {
    let mut preimage = [0u8; 64];
    preimage[12..32].copy_from_slice(account.as_slice());
    keccak256(preimage)
}

pub fn balance_of(host: &dyn StateDb, currency: Currency, account: Address) -> U256 {
    if currency.is_native() {
        host.get_balance(account)
    } else {
        let word = host.get_state(currency.address(), balance_slot(account));
        U256::from_be_bytes(word.0)
    }
}

fn write_token_balance(host: &mut dyn StateDb, token: Address, account: Address, value: U256) {
    host.set_state(token, balance_slot(account), B256::from(value.to_be_bytes::<32>()));
}

/// Move `amount` of `currency` from `from` to `to`.
///
/// Checks the sender's balance before touching state, so a failed transfer
/// writes nothing.
pub fn transfer(
    host: &mut dyn StateDb,
    currency: Currency,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<(), VaultError> {
    if amount.is_zero() || from == to {
        return Ok(());
    }
    let available = balance_of(host, currency, from);
    if available < amount {
        return Err(VaultError::InsufficientBalance {
            currency,
            account: from,
            needed: amount,
            available,
        });
    }
    let credited = balance_of(host, currency, to)
        .checked_add(amount)
        .ok_or(VaultError::BalanceOverflow {
            currency,
            account: to,
        })?;

    if currency.is_native() {
        host.sub_balance(from, amount);
        host.add_balance(to, amount);
    } else {
        let token = currency.address();
        write_token_balance(host, token, from, available - amount);
        write_token_balance(host, token, to, credited);
    }
    trace!("transfer {} {} {} -> {}", amount, currency, from, to);
    Ok(())
}

/// Create `amount` of `currency` in `to`'s balance.
pub fn mint(
    host: &mut dyn StateDb,
    currency: Currency,
    to: Address,
    amount: U256,
) -> Result<(), VaultError> {
    let credited = balance_of(host, currency, to)
        .checked_add(amount)
        .ok_or(VaultError::BalanceOverflow {
            currency,
            account: to,
        })?;
    if currency.is_native() {
        host.add_balance(to, amount);
    } else {
        if !host.exist(to) {
            host.create_account(to);
        }
        write_token_balance(host, currency.address(), to, credited);
    }
    Ok(())
}

/// Destroy `amount` of `currency` from `from`'s balance.
pub fn burn(
    host: &mut dyn StateDb,
    currency: Currency,
    from: Address,
    amount: U256,
) -> Result<(), VaultError> {
    let available = balance_of(host, currency, from);
    if available < amount {
        return Err(VaultError::InsufficientBalance {
            currency,
            account: from,
            needed: amount,
            available,
        });
    }
    if currency.is_native() {
        host.sub_balance(from, amount);
    } else {
        write_token_balance(host, currency.address(), from, available - amount);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::MemoryState;

    fn token() -> Currency {
        Currency::new(Address::with_last_byte(0x70))
    }

    #[test]
    fn test_balance_slot_layout() {
        let account = Address::with_last_byte(1);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&[0u8; 12]);
        preimage.extend_from_slice(account.as_slice());
        preimage.extend_from_slice(&[0u8; 32]);
        assert_eq!(balance_slot(account), keccak256(&preimage));
    }

    #[test]
    fn test_token_mint_and_transfer() {
        let mut state = MemoryState::new();
        let a = Address::with_last_byte(1);
        let b = Address::with_last_byte(2);
        mint(&mut state, token(), a, U256::from(100u64)).unwrap();
        transfer(&mut state, token(), a, b, U256::from(30u64)).unwrap();
        assert_eq!(balance_of(&state, token(), a), U256::from(70u64));
        assert_eq!(balance_of(&state, token(), b), U256::from(30u64));
        // token balances do not touch native balances
        assert_eq!(state.get_balance(a), U256::ZERO);
    }

    #[test]
    fn test_native_transfer() {
        let mut state = MemoryState::new();
        let a = Address::with_last_byte(1);
        let b = Address::with_last_byte(2);
        mint(&mut state, Currency::NATIVE, a, U256::from(5u64)).unwrap();
        transfer(&mut state, Currency::NATIVE, a, b, U256::from(5u64)).unwrap();
        assert_eq!(state.get_balance(b), U256::from(5u64));
    }

    #[test]
    fn test_insufficient_balance_writes_nothing() {
        let mut state = MemoryState::new();
        let a = Address::with_last_byte(1);
        let b = Address::with_last_byte(2);
        mint(&mut state, token(), a, U256::from(10u64)).unwrap();
        let err = transfer(&mut state, token(), a, b, U256::from(11u64)).unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientBalance {
                currency: token(),
                account: a,
                needed: U256::from(11u64),
                available: U256::from(10u64),
            }
        );
        assert_eq!(balance_of(&state, token(), a), U256::from(10u64));
        assert_eq!(balance_of(&state, token(), b), U256::ZERO);
    }

    #[test]
    fn test_burn() {
        let mut state = MemoryState::new();
        let a = Address::with_last_byte(1);
        mint(&mut state, token(), a, U256::from(10u64)).unwrap();
        burn(&mut state, token(), a, U256::from(4u64)).unwrap();
        assert_eq!(balance_of(&state, token(), a), U256::from(6u64));
        assert!(burn(&mut state, token(), a, U256::from(7u64)).is_err());
    }
}
