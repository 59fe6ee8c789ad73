pub mod currency;
pub mod delta;
pub mod ledger;
pub mod pool_key;
pub mod state;
pub mod vault;
