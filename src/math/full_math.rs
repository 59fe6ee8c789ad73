use crate::math::MathError;
use alloy_primitives::aliases::U512;
use alloy_primitives::U256;

fn widen(value: U256) -> U512 {
    let l = value.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(value: U512) -> Result<U256, MathError> {
    let l = value.as_limbs();
    if l[4..].iter().any(|limb| *limb != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

/// `floor(a * b / denominator)` with a full 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    narrow(widen(a) * widen(b) / widen(denominator))
}

/// `ceil(a * b / denominator)` with a full 512-bit intermediate product.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = widen(a) * widen(b);
    let denominator = widen(denominator);
    let mut quotient = product / denominator;
    if !(product % denominator).is_zero() {
        quotient += U512::from(1u64);
    }
    narrow(quotient)
}

/// `ceil(a / b)`.
pub fn div_rounding_up(a: U256, b: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = a / b;
    if (a % b).is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + U256::from(1u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Q128, Q96};

    #[test]
    fn test_mul_div_exact() {
        let r = mul_div(U256::from(6u64), U256::from(7u64), U256::from(3u64)).unwrap();
        assert_eq!(r, U256::from(14u64));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // (2^255 * 2^128) / 2^128 overflows 256 bits mid-way but not at the end
        let big = U256::from(1u8) << 255;
        assert_eq!(mul_div(big, Q128, Q128).unwrap(), big);
    }

    #[test]
    fn test_mul_div_result_overflow() {
        let r = mul_div(U256::MAX, U256::from(2u8), U256::from(1u8));
        assert_eq!(r, Err(MathError::Overflow));
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(
            mul_div(U256::from(1u8), U256::from(1u8), U256::ZERO),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_rounding_up() {
        assert_eq!(
            mul_div_rounding_up(U256::from(7u64), U256::from(1u64), U256::from(2u64)).unwrap(),
            U256::from(4u64)
        );
        assert_eq!(
            mul_div_rounding_up(Q96, U256::from(4u64), U256::from(2u64)).unwrap(),
            Q96 * U256::from(2u64)
        );
        assert_eq!(div_rounding_up(U256::from(9u64), U256::from(3u64)).unwrap(), U256::from(3u64));
        assert_eq!(div_rounding_up(U256::from(10u64), U256::from(3u64)).unwrap(), U256::from(4u64));
    }
}
