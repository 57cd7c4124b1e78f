// ============================================================================
// Quantums and Subticks
// Integer base units for order sizes and prices
// ============================================================================

use super::errors::{NumericError, NumericResult};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parts-per-million denominator used by fee and margin fractions.
pub const ONE_MILLION: i128 = 1_000_000;

/// Order and position size in the smallest tradable unit of the base asset.
///
/// Never negative. Signed position sizes are carried as plain `i128` so that
/// long/short deltas can be summed without a separate sign field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct BaseQuantums(u64);

impl BaseQuantums {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn checked_add(self, rhs: Self) -> NumericResult<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(NumericError::Overflow)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> NumericResult<Self> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(NumericError::Underflow)
    }

    /// Subtract, clamping at zero.
    #[inline]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// True if the size is a whole number of `step` increments.
    #[inline]
    pub fn is_multiple_of(self, step: u64) -> bool {
        step != 0 && self.0 % step == 0
    }

    /// Signed position delta for this size: positive for buys, negative for sells.
    #[inline]
    pub fn signed(self, is_buy: bool) -> i128 {
        if is_buy {
            self.0 as i128
        } else {
            -(self.0 as i128)
        }
    }

    /// Convert an absolute position size back into quantums.
    pub fn from_abs(value: i128) -> NumericResult<Self> {
        u64::try_from(value.unsigned_abs())
            .map(Self)
            .map_err(|_| NumericError::Overflow)
    }
}

impl fmt::Display for BaseQuantums {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order price in the smallest price increment of a clob pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct Subticks(u64);

impl Subticks {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_multiple_of(self, ticks: u64) -> bool {
        ticks != 0 && self.0 % ticks == 0
    }
}

impl fmt::Display for Subticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute `10^exp` as an i128.
fn pow10(exp: u32) -> NumericResult<i128> {
    10i128.checked_pow(exp).ok_or(NumericError::Overflow)
}

/// Quote quantums exchanged for `base` at `subticks`:
/// `base × subticks × 10^exponent`, truncated toward zero.
pub fn quote_quantums(
    base: BaseQuantums,
    subticks: Subticks,
    quantum_conversion_exponent: i32,
) -> NumericResult<i128> {
    let product = (base.value() as i128)
        .checked_mul(subticks.value() as i128)
        .ok_or(NumericError::Overflow)?;

    if quantum_conversion_exponent >= 0 {
        product
            .checked_mul(pow10(quantum_conversion_exponent as u32)?)
            .ok_or(NumericError::Overflow)
    } else {
        let divisor = pow10(quantum_conversion_exponent.unsigned_abs())?;
        Ok(product / divisor)
    }
}

/// `value × ppm / 10^6`, truncated toward zero.
pub fn apply_ppm(value: i128, ppm: i64) -> NumericResult<i128> {
    value
        .checked_mul(ppm as i128)
        .map(|v| v / ONE_MILLION)
        .ok_or(NumericError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let a = BaseQuantums::new(10);
        let b = BaseQuantums::new(4);

        assert_eq!(a.checked_add(b).unwrap(), BaseQuantums::new(14));
        assert_eq!(a.checked_sub(b).unwrap(), BaseQuantums::new(6));
        assert_eq!(b.checked_sub(a), Err(NumericError::Underflow));
        assert_eq!(
            BaseQuantums::new(u64::MAX).checked_add(b),
            Err(NumericError::Overflow)
        );
        assert_eq!(b.saturating_sub(a), BaseQuantums::ZERO);
    }

    #[test]
    fn test_signed_delta() {
        assert_eq!(BaseQuantums::new(7).signed(true), 7);
        assert_eq!(BaseQuantums::new(7).signed(false), -7);
        assert_eq!(BaseQuantums::from_abs(-7).unwrap(), BaseQuantums::new(7));
    }

    #[test]
    fn test_step_multiples() {
        assert!(BaseQuantums::new(30).is_multiple_of(10));
        assert!(!BaseQuantums::new(35).is_multiple_of(10));
        assert!(!BaseQuantums::new(35).is_multiple_of(0));
        assert!(Subticks::new(1_000).is_multiple_of(100));
    }

    #[test]
    fn test_quote_quantums_exponents() {
        let base = BaseQuantums::new(5);
        let price = Subticks::new(30);

        assert_eq!(quote_quantums(base, price, 0).unwrap(), 150);
        assert_eq!(quote_quantums(base, price, 2).unwrap(), 15_000);
        // Truncates toward zero
        assert_eq!(quote_quantums(base, price, -2).unwrap(), 1);
        assert_eq!(
            quote_quantums(base, price, 60),
            Err(NumericError::Overflow)
        );
    }

    #[test]
    fn test_apply_ppm() {
        assert_eq!(apply_ppm(1_000_000, 500).unwrap(), 500);
        assert_eq!(apply_ppm(-1_000_000, 500).unwrap(), -500);
        assert_eq!(apply_ppm(999, 500).unwrap(), 0);
    }
}
