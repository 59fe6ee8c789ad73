use alloy_primitives::{hex, Address};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An asset held in pools and custody accounts.
///
/// The zero address denotes the chain's native asset; any other address is
/// a token contract whose balances live in that contract's storage. Ordering
/// follows the address bytes, so the native asset always sorts first.
///
/// # Examples
///
/// ```
/// use dex_engine::core::currency::Currency;
/// use alloy_primitives::Address;
///
/// let token = Currency::new(Address::with_last_byte(7));
/// assert!(Currency::NATIVE < token);
/// assert!(Currency::NATIVE.is_native());
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Currency(Address);

impl Currency {
    pub const NATIVE: Currency = Currency(Address::ZERO);

    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }

    pub fn is_native(&self) -> bool {
        self.0 == Address::ZERO
    }

    /// Order two currencies the way a pool key requires.
    pub fn sort(a: Currency, b: Currency) -> (Currency, Currency) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "NATIVE")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<Address> for Currency {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for Currency {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("native") {
            return Ok(Self::NATIVE);
        }
        Address::from_str(s).map(Self)
    }
}
