//! Conversions between ticks and Q64.96 square-root prices.
//!
//! `sqrt_ratio_at_tick` reproduces the canonical bitwise algorithm: each set
//! bit of `|tick|` multiplies in a precomputed `sqrt(1.0001^-2^i)` in Q128.
//! `tick_at_sqrt_ratio` inverts it by bisection, so the two functions agree
//! exactly on every boundary.

use crate::math::MathError;
use alloy_primitives::U256;

/// Lowest tick whose price is representable.
pub const MIN_TICK: i32 = -887_272;

/// Highest tick whose price is representable.
pub const MAX_TICK: i32 = 887_272;

/// `sqrt_ratio_at_tick(MIN_TICK)`.
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([4_295_128_739, 0, 0, 0]);

/// `sqrt_ratio_at_tick(MAX_TICK)`.
pub const MAX_SQRT_RATIO: U256 =
    U256::from_limbs([0x5d95_1d52_6398_8d26, 0xefd1_fc6a_5064_8849, 0xfffd_8963, 0]);

const RATIO_MULTIPLIERS: [u128; 19] = [
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

/// Compute `sqrt(1.0001^tick) * 2^96`, rounded up.
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfBounds(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        U256::from(1u8) << 128
    };
    for (bit, multiplier) in RATIO_MULTIPLIERS.iter().enumerate() {
        if abs_tick & (0x2 << bit) != 0 {
            ratio = (ratio * U256::from(*multiplier)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up so the result never undershoots
    let round_up = !(ratio % (U256::from(1u64) << 32usize)).is_zero();
    let sqrt_price = ratio >> 32;
    Ok(if round_up {
        sqrt_price + U256::from(1u8)
    } else {
        sqrt_price
    })
}

/// Greatest tick `t` with `sqrt_ratio_at_tick(t) <= sqrt_price_x96`.
pub fn tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32, MathError> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 >= MAX_SQRT_RATIO {
        return Err(MathError::SqrtPriceOutOfBounds(sqrt_price_x96));
    }
    let mut low = MIN_TICK;
    let mut high = MAX_TICK;
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if sqrt_ratio_at_tick(mid)? <= sqrt_price_x96 {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Ok(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Q96;

    #[test]
    fn test_bounds_match_constants() {
        assert_eq!(sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
    }

    #[test]
    fn test_tick_zero_is_unit_price() {
        assert_eq!(sqrt_ratio_at_tick(0).unwrap(), Q96);
        assert_eq!(tick_at_sqrt_ratio(Q96).unwrap(), 0);
    }

    #[test]
    fn test_known_ticks() {
        assert_eq!(
            sqrt_ratio_at_tick(60).unwrap(),
            U256::from(79_466_191_966_197_645_195_421_774_833u128)
        );
        assert_eq!(
            sqrt_ratio_at_tick(-60).unwrap(),
            U256::from(78_990_846_045_029_531_151_608_375_686u128)
        );
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            sqrt_ratio_at_tick(MAX_TICK + 1),
            Err(MathError::TickOutOfBounds(MAX_TICK + 1))
        );
        assert!(tick_at_sqrt_ratio(MIN_SQRT_RATIO - U256::from(1u8)).is_err());
        assert!(tick_at_sqrt_ratio(MAX_SQRT_RATIO).is_err());
    }

    #[test]
    fn test_inverse_at_extremes() {
        assert_eq!(tick_at_sqrt_ratio(MIN_SQRT_RATIO).unwrap(), MIN_TICK);
        assert_eq!(
            tick_at_sqrt_ratio(MAX_SQRT_RATIO - U256::from(1u8)).unwrap(),
            MAX_TICK - 1
        );
    }

    #[test]
    fn test_round_trip_on_boundaries() {
        for tick in [-887_000, -50_000, -1, 1, 200, 10_000, 600_000] {
            let price = sqrt_ratio_at_tick(tick).unwrap();
            assert_eq!(tick_at_sqrt_ratio(price).unwrap(), tick);
            assert_eq!(tick_at_sqrt_ratio(price - U256::from(1u8)).unwrap(), tick - 1);
        }
    }
}
