use crate::core::delta::BalanceDelta;
use crate::core::pool_key::{PoolKey, MAX_FEE, MAX_TICK_SPACING, MIN_TICK_SPACING};
use crate::math::full_math::mul_div;
use crate::math::liquidity_math::add_delta;
use crate::math::sqrt_price_math::{signed_amount0_delta, signed_amount1_delta};
use crate::math::swap_math::compute_swap_step;
use crate::math::tick_math::{
    sqrt_ratio_at_tick, tick_at_sqrt_ratio, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK,
};
use crate::math::{to_f64, to_i128, MathError, Q128};
use crate::pool::error::PoolError;
use crate::pool::params::{ModifyLiquidityParams, SwapParams};
use crate::pool::position::{Position, PositionKey};
use crate::pool::tick::{fee_growth_inside, max_liquidity_per_tick, TickMap};
use alloy_primitives::{Address, U256};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a completed swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    /// What the caller owes (+) or is owed (-) in each currency.
    pub delta: BalanceDelta,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
    /// Total fee charged on the input currency.
    pub fee_amount: U256,
    pub ticks_crossed: u32,
}

/// State of a single concentrated-liquidity pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    key: PoolKey,
    sqrt_price_x96: U256,
    tick: i32,
    liquidity: u128,
    fee_growth_global0_x128: U256,
    fee_growth_global1_x128: U256,
    ticks: TickMap,
    /// "owner:lower:upper:salt" -> position
    #[serde(with = "positions_serde")]
    positions: HashMap<PositionKey, Position>,
}

mod positions_serde {
    use super::*;
    use alloy_primitives::B256;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;

    pub fn serialize<S: serde::Serializer>(
        positions: &HashMap<PositionKey, Position>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(positions.len()))?;
        for (key, position) in positions {
            map.serialize_entry(&key.to_string(), position)?;
        }
        map.end()
    }

    fn parse_key(key: &str) -> Option<PositionKey> {
        let mut parts = key.split(':');
        let owner: Address = parts.next()?.parse().ok()?;
        let tick_lower: i32 = parts.next()?.parse().ok()?;
        let tick_upper: i32 = parts.next()?.parse().ok()?;
        let salt: B256 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(PositionKey::new(owner, tick_lower, tick_upper, salt))
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<PositionKey, Position>, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = HashMap<PositionKey, Position>;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map with \"owner:lower:upper:salt\" keys")
            }
            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut map = HashMap::new();
                while let Some((key, value)) = access.next_entry::<String, Position>()? {
                    let parsed = parse_key(&key)
                        .ok_or_else(|| de::Error::custom(format!("invalid position key: {key}")))?;
                    map.insert(parsed, value);
                }
                Ok(map)
            }
        }
        deserializer.deserialize_map(V)
    }
}

/// A tick crossed during a swap, applied once the whole swap has succeeded.
struct Crossing {
    tick: i32,
    fee_growth_global0_x128: U256,
    fee_growth_global1_x128: U256,
}

impl Pool {
    /// Create a pool at `sqrt_price_x96`, validating the key's parameters.
    pub fn new(key: PoolKey, sqrt_price_x96: U256) -> Result<Self, PoolError> {
        if !key.is_sorted() {
            return Err(PoolError::CurrencyNotSorted {
                currency0: key.currency0,
                currency1: key.currency1,
            });
        }
        if key.fee >= MAX_FEE {
            return Err(PoolError::InvalidFee(key.fee));
        }
        if !(MIN_TICK_SPACING..=MAX_TICK_SPACING).contains(&key.tick_spacing) {
            return Err(PoolError::InvalidTickSpacing(key.tick_spacing));
        }
        if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 >= MAX_SQRT_RATIO {
            return Err(PoolError::InvalidSqrtPrice(sqrt_price_x96));
        }
        let tick = tick_at_sqrt_ratio(sqrt_price_x96)?;
        Ok(Self {
            key,
            sqrt_price_x96,
            tick,
            liquidity: 0,
            fee_growth_global0_x128: U256::ZERO,
            fee_growth_global1_x128: U256::ZERO,
            ticks: TickMap::new(),
            positions: HashMap::new(),
        })
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn sqrt_price_x96(&self) -> U256 {
        self.sqrt_price_x96
    }

    pub fn tick(&self) -> i32 {
        self.tick
    }

    pub fn liquidity(&self) -> u128 {
        self.liquidity
    }

    pub fn fee_growth_global(&self) -> (U256, U256) {
        (self.fee_growth_global0_x128, self.fee_growth_global1_x128)
    }

    pub fn ticks(&self) -> &TickMap {
        &self.ticks
    }

    pub fn position(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn positions(&self) -> &HashMap<PositionKey, Position> {
        &self.positions
    }

    /// Spot price of currency0 in units of currency1.
    pub fn price(&self) -> f64 {
        let sqrt = to_f64(self.sqrt_price_x96) / 2f64.powi(96);
        sqrt * sqrt
    }

    fn check_ticks(&self, tick_lower: i32, tick_upper: i32) -> Result<(), PoolError> {
        if tick_lower >= tick_upper {
            return Err(PoolError::InvalidTickRange {
                lower: tick_lower,
                upper: tick_upper,
            });
        }
        if tick_lower < MIN_TICK {
            return Err(PoolError::TickOutOfBounds(tick_lower));
        }
        if tick_upper > MAX_TICK {
            return Err(PoolError::TickOutOfBounds(tick_upper));
        }
        let spacing = i32::from(self.key.tick_spacing);
        for tick in [tick_lower, tick_upper] {
            if tick % spacing != 0 {
                return Err(PoolError::TickMisaligned {
                    tick,
                    tick_spacing: self.key.tick_spacing,
                });
            }
        }
        Ok(())
    }

    /// Change `owner`'s liquidity over a range.
    ///
    /// Returns `(principal, fees)`: the principal owed for the liquidity
    /// change and the (non-positive) fees paid out to the owner. Nothing is
    /// written unless every step succeeds.
    pub fn modify_liquidity(
        &mut self,
        owner: Address,
        params: &ModifyLiquidityParams,
    ) -> Result<(BalanceDelta, BalanceDelta), PoolError> {
        let ModifyLiquidityParams {
            tick_lower,
            tick_upper,
            liquidity_delta,
            salt,
        } = *params;
        self.check_ticks(tick_lower, tick_upper)?;

        let position_key = PositionKey::new(owner, tick_lower, tick_upper, salt);
        let mut position = self.positions.get(&position_key).copied().unwrap_or_default();
        let mut lower = self.ticks.info(tick_lower);
        let mut upper = self.ticks.info(tick_upper);

        if liquidity_delta != 0 {
            let max_liquidity = max_liquidity_per_tick(self.key.tick_spacing);
            lower.update(
                tick_lower,
                self.tick,
                liquidity_delta,
                self.fee_growth_global0_x128,
                self.fee_growth_global1_x128,
                false,
                max_liquidity,
            )?;
            upper.update(
                tick_upper,
                self.tick,
                liquidity_delta,
                self.fee_growth_global0_x128,
                self.fee_growth_global1_x128,
                true,
                max_liquidity,
            )?;
        }

        let (inside0, inside1) = fee_growth_inside(
            &lower,
            &upper,
            tick_lower,
            tick_upper,
            self.tick,
            self.fee_growth_global0_x128,
            self.fee_growth_global1_x128,
        );
        let (fees0, fees1) = position.update(liquidity_delta, inside0, inside1)?;
        let fees = BalanceDelta::new(-to_i128(fees0)?, -to_i128(fees1)?);

        let sqrt_lower = sqrt_ratio_at_tick(tick_lower)?;
        let sqrt_upper = sqrt_ratio_at_tick(tick_upper)?;
        let mut liquidity = self.liquidity;
        let principal = if liquidity_delta == 0 {
            BalanceDelta::ZERO
        } else if self.tick < tick_lower {
            BalanceDelta::new(
                signed_amount0_delta(sqrt_lower, sqrt_upper, liquidity_delta)?,
                0,
            )
        } else if self.tick < tick_upper {
            liquidity = add_delta(liquidity, liquidity_delta)?;
            BalanceDelta::new(
                signed_amount0_delta(self.sqrt_price_x96, sqrt_upper, liquidity_delta)?,
                signed_amount1_delta(sqrt_lower, self.sqrt_price_x96, liquidity_delta)?,
            )
        } else {
            BalanceDelta::new(
                0,
                signed_amount1_delta(sqrt_lower, sqrt_upper, liquidity_delta)?,
            )
        };

        self.ticks.set(tick_lower, lower);
        self.ticks.set(tick_upper, upper);
        if position.liquidity == 0 {
            self.positions.remove(&position_key);
        } else {
            self.positions.insert(position_key, position);
        }
        self.liquidity = liquidity;

        debug!(
            "modify_liquidity [{}, {}) by {} -> principal {} fees {}",
            tick_lower, tick_upper, liquidity_delta, principal, fees
        );
        Ok((principal, fees))
    }

    /// Run a swap to completion. State is only written once the whole swap
    /// has been computed.
    pub fn swap(&mut self, params: &SwapParams) -> Result<SwapResult, PoolError> {
        if params.amount_specified == 0 {
            return Err(PoolError::SwapAmountZero);
        }
        let zero_for_one = params.zero_for_one;
        let limit = if zero_for_one {
            let limit = params
                .sqrt_price_limit_x96
                .max(MIN_SQRT_RATIO + U256::from(1u8));
            if limit >= self.sqrt_price_x96 {
                return Err(PoolError::PriceLimitOutOfBounds(params.sqrt_price_limit_x96));
            }
            limit
        } else {
            let limit = params
                .sqrt_price_limit_x96
                .min(MAX_SQRT_RATIO - U256::from(1u8));
            if limit <= self.sqrt_price_x96 {
                return Err(PoolError::PriceLimitOutOfBounds(params.sqrt_price_limit_x96));
            }
            limit
        };

        let exact_input = params.amount_specified > 0;
        let fee = self.key.fee;
        let mut remaining = params.amount_specified;
        let mut sqrt_price = self.sqrt_price_x96;
        let mut tick = self.tick;
        let mut liquidity = self.liquidity;
        let mut fee_growth_input = if zero_for_one {
            self.fee_growth_global0_x128
        } else {
            self.fee_growth_global1_x128
        };
        let mut amount_in = U256::ZERO;
        let mut amount_out = U256::ZERO;
        let mut fee_total = U256::ZERO;
        let mut crossings: Vec<Crossing> = Vec::new();

        while remaining != 0 && sqrt_price != limit {
            let step_start = sqrt_price;
            let (tick_next, initialized) = self.ticks.next_initialized(tick, zero_for_one);
            let sqrt_next = sqrt_ratio_at_tick(tick_next)?;
            let target = if zero_for_one {
                sqrt_next.max(limit)
            } else {
                sqrt_next.min(limit)
            };

            let step = compute_swap_step(sqrt_price, target, liquidity, remaining, fee)?;
            sqrt_price = step.sqrt_price_next_x96;

            if exact_input {
                remaining = remaining
                    .checked_sub(to_i128(step.amount_in + step.fee_amount)?)
                    .ok_or(MathError::Underflow)?;
            } else {
                remaining = remaining
                    .checked_add(to_i128(step.amount_out)?)
                    .ok_or(MathError::Overflow)?;
            }
            amount_in = amount_in
                .checked_add(step.amount_in + step.fee_amount)
                .ok_or(MathError::Overflow)?;
            amount_out = amount_out
                .checked_add(step.amount_out)
                .ok_or(MathError::Overflow)?;
            fee_total += step.fee_amount;

            if liquidity > 0 {
                let growth = mul_div(step.fee_amount, Q128, U256::from(liquidity))?;
                fee_growth_input = fee_growth_input.wrapping_add(growth);
            }

            if sqrt_price == sqrt_next {
                if initialized {
                    let (growth0, growth1) = if zero_for_one {
                        (fee_growth_input, self.fee_growth_global1_x128)
                    } else {
                        (self.fee_growth_global0_x128, fee_growth_input)
                    };
                    crossings.push(Crossing {
                        tick: tick_next,
                        fee_growth_global0_x128: growth0,
                        fee_growth_global1_x128: growth1,
                    });
                    let mut net = self.ticks.info(tick_next).liquidity_net;
                    if zero_for_one {
                        net = -net;
                    }
                    liquidity = add_delta(liquidity, net)?;
                }
                tick = if zero_for_one { tick_next - 1 } else { tick_next };
            } else if sqrt_price != step_start {
                tick = tick_at_sqrt_ratio(sqrt_price)?;
            }
        }

        let amount_in = to_i128(amount_in)?;
        let amount_out = to_i128(amount_out)?;

        let ticks_crossed = crossings.len() as u32;
        for crossing in crossings {
            self.ticks.cross(
                crossing.tick,
                crossing.fee_growth_global0_x128,
                crossing.fee_growth_global1_x128,
            );
        }
        self.sqrt_price_x96 = sqrt_price;
        self.tick = tick;
        self.liquidity = liquidity;
        if zero_for_one {
            self.fee_growth_global0_x128 = fee_growth_input;
        } else {
            self.fee_growth_global1_x128 = fee_growth_input;
        }

        let delta = if zero_for_one {
            BalanceDelta::new(amount_in, -amount_out)
        } else {
            BalanceDelta::new(-amount_out, amount_in)
        };
        debug!(
            "swap {} zero_for_one={} -> delta {} tick {} crossed {}",
            self.key, zero_for_one, delta, tick, ticks_crossed
        );
        Ok(SwapResult {
            delta,
            sqrt_price_x96: sqrt_price,
            tick,
            liquidity,
            fee_amount: fee_total,
            ticks_crossed,
        })
    }

    /// Credit fees to in-range liquidity. Returns false, crediting nothing,
    /// when there is no liquidity to receive them.
    pub fn distribute_fees(&mut self, amount0: U256, amount1: U256) -> Result<bool, PoolError> {
        if self.liquidity == 0 {
            return Ok(false);
        }
        let liquidity = U256::from(self.liquidity);
        let growth0 = mul_div(amount0, Q128, liquidity)?;
        let growth1 = mul_div(amount1, Q128, liquidity)?;
        self.fee_growth_global0_x128 = self.fee_growth_global0_x128.wrapping_add(growth0);
        self.fee_growth_global1_x128 = self.fee_growth_global1_x128.wrapping_add(growth1);
        Ok(true)
    }

    /// Donate to in-range liquidity without moving the price. The caller
    /// owes both amounts.
    pub fn donate(&mut self, amount0: U256, amount1: U256) -> Result<BalanceDelta, PoolError> {
        if self.liquidity == 0 {
            return Err(PoolError::NoLiquidityToReceiveFees);
        }
        let delta = BalanceDelta::new(to_i128(amount0)?, to_i128(amount1)?);
        self.distribute_fees(amount0, amount1)?;
        Ok(delta)
    }
}
