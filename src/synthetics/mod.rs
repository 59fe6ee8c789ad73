//! Synthetic debt issuance and conversion back to the underlying.
//!
//! The [`alchemist::Alchemist`] lends synthetic tokens against yield-bearing
//! collateral and repays debt from the collateral's yield. Repaid yield is
//! handed to the [`transmuter::Transmuter`], which converts staked synthetics
//! into underlying pro rata.

pub mod alchemist;
pub mod transmuter;

pub use alchemist::{Account, Alchemist, AlchemistError, SyntheticToken, YieldToken};
pub use transmuter::{Transmuter, TransmuterError, TransmuterStake, TransmuterState};
