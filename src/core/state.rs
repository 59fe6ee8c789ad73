//! The host state interface and two implementations of it.
//!
//! [`StateDb`] is the key-value view of the chain the engine runs inside.
//! [`MemoryState`] is a self-contained host for tests, benches and the CLI.
//! [`Journal`] buffers writes over any other host until `commit`, which is
//! how a lock discards every side effect of a failed operation.

use alloy_primitives::{Address, B256, U256};
use std::collections::{HashMap, HashSet};

/// Abstract host storage.
///
/// `sub_balance` is only called after the caller has checked the balance;
/// implementations may saturate.
pub trait StateDb {
    fn get_state(&self, owner: Address, key: B256) -> B256;
    fn set_state(&mut self, owner: Address, key: B256, value: B256);
    fn get_balance(&self, account: Address) -> U256;
    fn add_balance(&mut self, account: Address, amount: U256);
    fn sub_balance(&mut self, account: Address, amount: U256);
    fn exist(&self, account: Address) -> bool;
    fn create_account(&mut self, account: Address);
    fn block_number(&self) -> u64;
}

/// In-memory host.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    storage: HashMap<(Address, B256), B256>,
    balances: HashMap<Address, U256>,
    accounts: HashSet<Address>,
    block: u64,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_block(block: u64) -> Self {
        Self {
            block,
            ..Self::default()
        }
    }

    pub fn set_block_number(&mut self, block: u64) {
        self.block = block;
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block = self.block.saturating_add(blocks);
    }

    /// Number of non-empty storage slots.
    pub fn storage_len(&self) -> usize {
        self.storage.len()
    }
}

impl StateDb for MemoryState {
    fn get_state(&self, owner: Address, key: B256) -> B256 {
        self.storage.get(&(owner, key)).copied().unwrap_or(B256::ZERO)
    }

    fn set_state(&mut self, owner: Address, key: B256, value: B256) {
        if value == B256::ZERO {
            self.storage.remove(&(owner, key));
        } else {
            self.storage.insert((owner, key), value);
        }
    }

    fn get_balance(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or(U256::ZERO)
    }

    fn add_balance(&mut self, account: Address, amount: U256) {
        self.accounts.insert(account);
        let balance = self.balances.entry(account).or_insert(U256::ZERO);
        *balance = balance.saturating_add(amount);
    }

    fn sub_balance(&mut self, account: Address, amount: U256) {
        let balance = self.balances.entry(account).or_insert(U256::ZERO);
        *balance = balance.saturating_sub(amount);
    }

    fn exist(&self, account: Address) -> bool {
        self.accounts.contains(&account)
    }

    fn create_account(&mut self, account: Address) {
        self.accounts.insert(account);
    }

    fn block_number(&self) -> u64 {
        self.block
    }
}

/// Write-buffering overlay over another host.
///
/// Reads fall through to the inner host for anything not yet written.
/// Dropping the journal discards every buffered write.
pub struct Journal<'a> {
    inner: &'a mut dyn StateDb,
    storage: HashMap<(Address, B256), B256>,
    balances: HashMap<Address, U256>,
    created: HashSet<Address>,
}

impl<'a> Journal<'a> {
    pub fn new(inner: &'a mut dyn StateDb) -> Self {
        Self {
            inner,
            storage: HashMap::new(),
            balances: HashMap::new(),
            created: HashSet::new(),
        }
    }

    /// Flush every buffered write into the inner host.
    pub fn commit(self) {
        let Journal {
            inner,
            storage,
            balances,
            created,
        } = self;
        for account in created {
            inner.create_account(account);
        }
        for ((owner, key), value) in storage {
            inner.set_state(owner, key, value);
        }
        for (account, balance) in balances {
            let current = inner.get_balance(account);
            if balance > current {
                inner.add_balance(account, balance - current);
            } else if balance < current {
                inner.sub_balance(account, current - balance);
            }
        }
    }
}

impl StateDb for Journal<'_> {
    fn get_state(&self, owner: Address, key: B256) -> B256 {
        match self.storage.get(&(owner, key)) {
            Some(value) => *value,
            None => self.inner.get_state(owner, key),
        }
    }

    fn set_state(&mut self, owner: Address, key: B256, value: B256) {
        self.storage.insert((owner, key), value);
    }

    fn get_balance(&self, account: Address) -> U256 {
        match self.balances.get(&account) {
            Some(balance) => *balance,
            None => self.inner.get_balance(account),
        }
    }

    fn add_balance(&mut self, account: Address, amount: U256) {
        let next = self.get_balance(account).saturating_add(amount);
        self.balances.insert(account, next);
        if !self.inner.exist(account) {
            self.created.insert(account);
        }
    }

    fn sub_balance(&mut self, account: Address, amount: U256) {
        let next = self.get_balance(account).saturating_sub(amount);
        self.balances.insert(account, next);
    }

    fn exist(&self, account: Address) -> bool {
        self.created.contains(&account) || self.inner.exist(account)
    }

    fn create_account(&mut self, account: Address) {
        if !self.inner.exist(account) {
            self.created.insert(account);
        }
    }

    fn block_number(&self) -> u64 {
        self.inner.block_number()
    }
}
