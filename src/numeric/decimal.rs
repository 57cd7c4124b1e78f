// ============================================================================
// Decimal Bridge
// Conversions between integer quantums and rust_decimal margin math
// ============================================================================

use super::errors::{NumericError, NumericResult};
use super::quantums::ONE_MILLION;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Lift an integer amount into a `Decimal`.
///
/// # Errors
/// - `Overflow` if the value exceeds the 96-bit decimal mantissa
pub fn to_decimal(value: i128) -> NumericResult<Decimal> {
    Decimal::try_from_i128_with_scale(value, 0).map_err(|_| NumericError::Overflow)
}

/// Truncate a `Decimal` toward zero into an integer amount.
pub fn truncate_to_i128(value: Decimal) -> NumericResult<i128> {
    value.trunc().to_i128().ok_or(NumericError::Overflow)
}

/// `value × ppm / 10^6` in decimal arithmetic.
pub fn decimal_ppm(value: Decimal, ppm: u32) -> NumericResult<Decimal> {
    value
        .checked_mul(Decimal::from(ppm))
        .and_then(|v| v.checked_div(Decimal::from(ONE_MILLION as u64)))
        .ok_or(NumericError::Overflow)
}

pub fn checked_mul(lhs: Decimal, rhs: Decimal) -> NumericResult<Decimal> {
    lhs.checked_mul(rhs).ok_or(NumericError::Overflow)
}

pub fn checked_add(lhs: Decimal, rhs: Decimal) -> NumericResult<Decimal> {
    lhs.checked_add(rhs).ok_or(NumericError::Overflow)
}

pub fn checked_div(lhs: Decimal, rhs: Decimal) -> NumericResult<Decimal> {
    if rhs.is_zero() {
        return Err(NumericError::DivisionByZero);
    }
    lhs.checked_div(rhs).ok_or(NumericError::Overflow)
}
