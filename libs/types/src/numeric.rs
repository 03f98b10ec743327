//! Base-unit amount arithmetic
//!
//! Amounts are unsigned integer base units (`u128`). A single record's yield
//! amount must fit in 96 bits. Proportional splits use a 256-bit
//! intermediate product so `a * b / c` is exact for any `u128` inputs whose
//! quotient fits back into `u128`.

use crate::errors::AmountError;

/// Base-unit token amount.
pub type Amount = u128;

/// Largest yield amount a single record may carry (2^96 - 1).
pub const MAX_RECORD_AMOUNT: Amount = (1u128 << 96) - 1;

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two `u128` values as `(high, low)` words.
pub fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_MASK);
    let (b1, b0) = (b >> 64, b & LOW_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // Sum of three values below 2^64 each; cannot overflow.
    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
    let low = (p00 & LOW_MASK) | (mid << 64);
    let high = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (high, low)
}

/// `floor(a * b / divisor)` without intermediate overflow.
///
/// Fails with `DivisionByZero` for a zero divisor and `Overflow` when the
/// quotient does not fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, divisor: u128) -> Result<u128, AmountError> {
    if divisor == 0 {
        return Err(AmountError::DivisionByZero);
    }

    let (high, low) = widening_mul(a, b);
    if high == 0 {
        return Ok(low / divisor);
    }
    if high >= divisor {
        return Err(AmountError::Overflow);
    }

    // Shift-subtract long division of (high, low) by divisor.
    let mut remainder = high;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = remainder >> 127;
        remainder = (remainder << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || remainder >= divisor {
            remainder = remainder.wrapping_sub(divisor);
            quotient |= 1;
        }
    }
    Ok(quotient)
}

/// Overflow-checked sum.
pub fn checked_sum<I>(amounts: I) -> Result<Amount, AmountError>
where
    I: IntoIterator<Item = Amount>,
{
    amounts
        .into_iter()
        .try_fold(0u128, |acc, x| acc.checked_add(x).ok_or(AmountError::Overflow))
}

/// Reject amounts wider than a record can hold.
pub fn ensure_record_width(amount: Amount) -> Result<Amount, AmountError> {
    if amount > MAX_RECORD_AMOUNT {
        return Err(AmountError::OutOfRange {
            amount,
            max: MAX_RECORD_AMOUNT,
        });
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_widening_mul_small() {
        assert_eq!(widening_mul(6, 7), (0, 42));
    }

    #[test]
    fn test_widening_mul_max() {
        // (2^128 - 1)^2 = 2^256 - 2^129 + 1
        let (high, low) = widening_mul(u128::MAX, u128::MAX);
        assert_eq!(high, u128::MAX - 1);
        assert_eq!(low, 1);
    }

    #[test]
    fn test_mul_div_floor_rounds_down() {
        assert_eq!(mul_div_floor(99, 60, 100).unwrap(), 59);
        assert_eq!(mul_div_floor(99, 40, 100).unwrap(), 39);
    }

    #[test]
    fn test_mul_div_floor_wide_intermediate() {
        let whale = 10u128.pow(30);
        // 1e30 * 1e30 overflows u128, the quotient does not.
        assert_eq!(mul_div_floor(whale, whale, whale).unwrap(), whale);
        assert_eq!(
            mul_div_floor(u128::MAX, u128::MAX, u128::MAX).unwrap(),
            u128::MAX
        );
    }

    #[test]
    fn test_mul_div_floor_zero_divisor() {
        assert_eq!(mul_div_floor(1, 1, 0), Err(AmountError::DivisionByZero));
    }

    #[test]
    fn test_mul_div_floor_quotient_overflow() {
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), Err(AmountError::Overflow));
    }

    #[test]
    fn test_checked_sum_overflow() {
        assert_eq!(checked_sum([u128::MAX, 1]), Err(AmountError::Overflow));
        assert_eq!(checked_sum([60, 40]), Ok(100));
    }

    #[test]
    fn test_ensure_record_width() {
        assert_eq!(ensure_record_width(MAX_RECORD_AMOUNT), Ok(MAX_RECORD_AMOUNT));
        assert!(matches!(
            ensure_record_width(MAX_RECORD_AMOUNT + 1),
            Err(AmountError::OutOfRange { .. })
        ));
    }

    proptest! {
        /// Agrees with native arithmetic whenever the product fits in u128.
        #[test]
        fn fuzz_mul_div_matches_native(
            a in 0u128..=u64::MAX as u128,
            b in 0u128..=u64::MAX as u128,
            d in 1u128..=u64::MAX as u128,
        ) {
            prop_assert_eq!(mul_div_floor(a, b, d).unwrap(), a * b / d);
        }

        /// floor(a * b / b) == a for any non-zero b.
        #[test]
        fn fuzz_mul_div_identity(a in any::<u128>(), b in 1u128..) {
            prop_assert_eq!(mul_div_floor(a, b, b).unwrap(), a);
        }
    }
}
