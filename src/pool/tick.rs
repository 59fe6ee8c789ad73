use crate::math::liquidity_math::add_delta;
use crate::math::tick_math::{MAX_TICK, MIN_TICK};
use crate::pool::error::PoolError;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-tick liquidity and fee bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    /// Total liquidity referencing this tick as either boundary.
    pub liquidity_gross: u128,
    /// Liquidity added when the price crosses this tick left to right.
    pub liquidity_net: i128,
    /// Fee growth on the side of this tick away from the current price.
    pub fee_growth_outside0_x128: U256,
    pub fee_growth_outside1_x128: U256,
}

impl TickInfo {
    pub fn is_initialized(&self) -> bool {
        self.liquidity_gross > 0
    }

    /// Apply a liquidity change to this tick as the `upper` or lower
    /// boundary of a range. Returns whether the tick flipped between
    /// initialized and uninitialized.
    ///
    /// On first initialization, all growth so far is assumed to have
    /// happened below the tick.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global0_x128: U256,
        fee_growth_global1_x128: U256,
        upper: bool,
        max_liquidity: u128,
    ) -> Result<bool, PoolError> {
        let gross_before = self.liquidity_gross;
        let gross_after = add_delta(gross_before, liquidity_delta)?;
        if gross_after > max_liquidity {
            return Err(PoolError::TickLiquidityOverflow(tick));
        }
        let net_after = if upper {
            self.liquidity_net.checked_sub(liquidity_delta)
        } else {
            self.liquidity_net.checked_add(liquidity_delta)
        }
        .ok_or(PoolError::TickLiquidityOverflow(tick))?;

        if gross_before == 0 && tick <= tick_current {
            self.fee_growth_outside0_x128 = fee_growth_global0_x128;
            self.fee_growth_outside1_x128 = fee_growth_global1_x128;
        }
        self.liquidity_gross = gross_after;
        self.liquidity_net = net_after;
        Ok((gross_after == 0) != (gross_before == 0))
    }
}

/// Maximum gross liquidity a single tick may carry for a spacing, so that
/// the active liquidity can never overflow a `u128`.
pub fn max_liquidity_per_tick(tick_spacing: i16) -> u128 {
    let spacing = i32::from(tick_spacing.max(1));
    let min_tick = (MIN_TICK / spacing) * spacing;
    let max_tick = (MAX_TICK / spacing) * spacing;
    let num_ticks = ((max_tick - min_tick) / spacing) as u128 + 1;
    u128::MAX / num_ticks
}

/// Initialized ticks of a pool, sorted so that the next initialized tick in
/// either direction is a single `BTreeMap` range lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMap {
    ticks: BTreeMap<i32, TickInfo>,
}

impl TickMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a tick's info, zeroed if the tick is not initialized.
    pub fn info(&self, tick: i32) -> TickInfo {
        self.ticks.get(&tick).copied().unwrap_or_default()
    }

    /// Store `info`, dropping the tick once nothing references it.
    pub fn set(&mut self, tick: i32, info: TickInfo) {
        if info.is_initialized() {
            self.ticks.insert(tick, info);
        } else {
            self.ticks.remove(&tick);
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Flip the outside growth of `tick` as the price crosses it and return
    /// its `liquidity_net`.
    pub fn cross(
        &mut self,
        tick: i32,
        fee_growth_global0_x128: U256,
        fee_growth_global1_x128: U256,
    ) -> i128 {
        match self.ticks.get_mut(&tick) {
            Some(info) => {
                info.fee_growth_outside0_x128 =
                    fee_growth_global0_x128.wrapping_sub(info.fee_growth_outside0_x128);
                info.fee_growth_outside1_x128 =
                    fee_growth_global1_x128.wrapping_sub(info.fee_growth_outside1_x128);
                info.liquidity_net
            }
            None => 0,
        }
    }

    /// Next initialized tick at or below `tick` when `lte`, or strictly
    /// above it otherwise. Falls back to the global bound when there is none.
    pub fn next_initialized(&self, tick: i32, lte: bool) -> (i32, bool) {
        if lte {
            match self.ticks.range(..=tick).next_back() {
                Some((t, _)) => (*t, true),
                None => (MIN_TICK, false),
            }
        } else {
            match tick.checked_add(1).and_then(|from| self.ticks.range(from..).next()) {
                Some((t, _)) => (*t, true),
                None => (MAX_TICK, false),
            }
        }
    }
}

/// Fee growth inside a range given its two boundary ticks. All arithmetic
/// wraps; only differences of these values are meaningful.
pub fn fee_growth_inside(
    lower: &TickInfo,
    upper: &TickInfo,
    tick_lower: i32,
    tick_upper: i32,
    tick_current: i32,
    fee_growth_global0_x128: U256,
    fee_growth_global1_x128: U256,
) -> (U256, U256) {
    let (below0, below1) = if tick_current >= tick_lower {
        (lower.fee_growth_outside0_x128, lower.fee_growth_outside1_x128)
    } else {
        (
            fee_growth_global0_x128.wrapping_sub(lower.fee_growth_outside0_x128),
            fee_growth_global1_x128.wrapping_sub(lower.fee_growth_outside1_x128),
        )
    };
    let (above0, above1) = if tick_current < tick_upper {
        (upper.fee_growth_outside0_x128, upper.fee_growth_outside1_x128)
    } else {
        (
            fee_growth_global0_x128.wrapping_sub(upper.fee_growth_outside0_x128),
            fee_growth_global1_x128.wrapping_sub(upper.fee_growth_outside1_x128),
        )
    };
    (
        fee_growth_global0_x128
            .wrapping_sub(below0)
            .wrapping_sub(above0),
        fee_growth_global1_x128
            .wrapping_sub(below1)
            .wrapping_sub(above1),
    )
}
