use crate::core::currency::Currency;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deltas owed within one open lock.
///
/// A positive delta means the frame's caller owes the pool manager.
/// A negative delta means the pool manager owes the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFrame {
    caller: Address,
    /// Currency -> net delta; zero entries are removed
    #[serde(with = "deltas_serde")]
    deltas: HashMap<Currency, i128>,
    /// Set when an operation failed after changing pool state
    #[serde(default)]
    reverted: bool,
}

mod deltas_serde {
    use super::*;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;

    pub fn serialize<S: serde::Serializer>(
        deltas: &HashMap<Currency, i128>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(deltas.len()))?;
        for (currency, amount) in deltas {
            map.serialize_entry(&currency.address().to_string(), &amount.to_string())?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<Currency, i128>, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = HashMap<Currency, i128>;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map from currency address to decimal delta")
            }
            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut map = HashMap::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    let currency: Currency = key
                        .parse()
                        .map_err(|_| de::Error::custom(format!("invalid currency: {key}")))?;
                    let amount: i128 = value
                        .parse()
                        .map_err(|_| de::Error::custom(format!("invalid delta: {value}")))?;
                    map.insert(currency, amount);
                }
                Ok(map)
            }
        }
        deserializer.deserialize_map(V)
    }
}

impl LockFrame {
    pub fn new(caller: Address) -> Self {
        Self {
            caller,
            deltas: HashMap::new(),
            reverted: false,
        }
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn delta(&self, currency: &Currency) -> i128 {
        self.deltas.get(currency).copied().unwrap_or(0)
    }

    /// True when every currency nets to exactly zero and no operation
    /// left the frame half-applied.
    pub fn is_settled(&self) -> bool {
        self.deltas.is_empty() && !self.reverted
    }

    /// Nonzero deltas, sorted by currency.
    pub fn outstanding(&self) -> Vec<(Currency, i128)> {
        let mut out: Vec<(Currency, i128)> = self.deltas.iter().map(|(c, d)| (*c, *d)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// The stack of open lock frames ("flash accounting").
///
/// Every operation books into the top frame only; a frame can be popped
/// successfully only once all of its deltas are zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashLedger {
    frames: Vec<LockFrame>,
}

impl FlashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a frame for `caller`. Returns the new depth.
    pub fn push(&mut self, caller: Address) -> usize {
        self.frames.push(LockFrame::new(caller));
        self.frames.len()
    }

    pub fn pop(&mut self) -> Option<LockFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_locked(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn current(&self) -> Option<&LockFrame> {
        self.frames.last()
    }

    pub fn current_caller(&self) -> Option<Address> {
        self.frames.last().map(|f| f.caller)
    }

    /// Add `amount` to the top frame's delta for `currency`.
    ///
    /// Returns the new delta, or `None` when no frame is open or the sum
    /// overflows. The ledger is unchanged on `None`.
    pub fn apply(&mut self, currency: Currency, amount: i128) -> Option<i128> {
        let frame = self.frames.last_mut()?;
        let next = frame.delta(&currency).checked_add(amount)?;
        if next == 0 {
            frame.deltas.remove(&currency);
        } else {
            frame.deltas.insert(currency, next);
        }
        Some(next)
    }

    /// Mark the top frame so it can no longer settle.
    pub fn revert_current(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.reverted = true;
        }
    }

    /// Delta of the innermost frame opened by `caller`.
    pub fn delta(&self, caller: Address, currency: &Currency) -> i128 {
        self.frames
            .iter()
            .rev()
            .find(|f| f.caller == caller)
            .map(|f| f.delta(currency))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(n: u8) -> Currency {
        Currency::new(Address::with_last_byte(n))
    }

    #[test]
    fn test_apply_requires_open_frame() {
        let mut ledger = FlashLedger::new();
        assert_eq!(ledger.apply(token(1), 5), None);
        assert!(!ledger.is_locked());
    }

    #[test]
    fn test_frame_settles_when_net_zero() {
        let mut ledger = FlashLedger::new();
        let alice = Address::with_last_byte(0xa1);
        ledger.push(alice);

        ledger.apply(token(1), 100);
        ledger.apply(token(2), -40);
        assert!(!ledger.current().unwrap().is_settled());
        assert_eq!(ledger.delta(alice, &token(1)), 100);

        ledger.apply(token(1), -100);
        ledger.apply(token(2), 40);
        assert!(ledger.current().unwrap().is_settled());
        assert!(ledger.pop().unwrap().outstanding().is_empty());
    }

    #[test]
    fn test_nested_frames_are_isolated() {
        let mut ledger = FlashLedger::new();
        let outer = Address::with_last_byte(1);
        let inner = Address::with_last_byte(2);
        ledger.push(outer);
        ledger.apply(token(1), 7);
        ledger.push(inner);
        assert!(ledger.current().unwrap().is_settled());
        ledger.apply(token(1), 3);

        assert_eq!(ledger.delta(inner, &token(1)), 3);
        assert_eq!(ledger.delta(outer, &token(1)), 7);

        let frame = ledger.pop().unwrap();
        assert_eq!(frame.outstanding(), vec![(token(1), 3)]);
        assert_eq!(ledger.current_caller(), Some(outer));
    }

    #[test]
    fn test_overflow_leaves_delta_unchanged() {
        let mut ledger = FlashLedger::new();
        let caller = Address::with_last_byte(1);
        ledger.push(caller);
        ledger.apply(token(1), i128::MAX);
        assert_eq!(ledger.apply(token(1), 1), None);
        assert_eq!(ledger.delta(caller, &token(1)), i128::MAX);
    }

    #[test]
    fn test_reverted_frame_never_settles() {
        let mut ledger = FlashLedger::new();
        ledger.push(Address::with_last_byte(1));
        ledger.revert_current();
        let frame = ledger.pop().unwrap();
        assert!(frame.outstanding().is_empty());
        assert!(!frame.is_settled());
    }

    #[test]
    fn test_frame_serde() {
        let mut ledger = FlashLedger::new();
        ledger.push(Address::with_last_byte(9));
        ledger.apply(token(4), -12);
        let json = serde_json::to_string(&ledger).unwrap();
        assert!(json.contains("\"-12\""));
        let back: FlashLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back.current(), ledger.current());
    }
}
