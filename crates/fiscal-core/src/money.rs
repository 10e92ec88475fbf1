//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Commerce webhooks carry amounts as decimal STRINGS: "19990.00"         │
//! │                                                                         │
//! │  parse_decimal("19990.00") ──► Money(1_999_000)  (minor units)         │
//! │  parse_decimal("10.5")     ──► Money(1_050)                            │
//! │  parse_decimal("10.505")   ──► Err(TooPrecise)  never rounded          │
//! │                                                                         │
//! │  Only the fiscal wire payload converts back to a JSON number.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Number of fractional digits carried by [`Money`].
pub const SCALE: u32 = 2;

const FACTOR: i64 = 10_i64.pow(SCALE);

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor units (two implied decimals).
///
/// ## Design Decisions
/// - **i64 (signed)**: credit notes and discounts may be negative
/// - **Transparent in SQLite**: stored as INTEGER
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use fiscal_core::money::Money;
    ///
    /// let price = Money::from_minor(1099);
    /// assert_eq!(price.minor(), 1099);
    /// assert_eq!(price.to_string(), "10.99");
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parses a decimal string without rounding.
    ///
    /// ## Rules
    /// - Optional leading `-`, digits, optional `.` and fraction digits
    /// - Fraction digits beyond [`SCALE`] are accepted only when they are zeros
    /// - Empty or whitespace-only input is a format error
    ///
    /// ## Example
    /// ```rust
    /// use fiscal_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("price", "12.5").unwrap().minor(), 1250);
    /// assert_eq!(Money::parse_decimal("price", "3.000").unwrap().minor(), 300);
    /// assert!(Money::parse_decimal("price", "3.001").is_err());
    /// ```
    pub fn parse_decimal(field: &str, raw: &str) -> Result<Money, ValidationError> {
        let text = raw.trim();
        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, fraction) = match unsigned.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (unsigned, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(ValidationError::invalid(field, "empty amount"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::invalid(
                field,
                format!("'{raw}' is not a decimal number"),
            ));
        }

        let scale = SCALE as usize;
        if fraction.len() > scale && fraction[scale..].chars().any(|c| c != '0') {
            return Err(ValidationError::TooPrecise {
                field: field.to_string(),
                value: raw.to_string(),
                scale: SCALE,
            });
        }

        let overflow = || ValidationError::invalid(field, format!("'{raw}' is out of range"));

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };

        let mut fraction_value: i64 = 0;
        for (i, digit) in fraction.chars().take(scale).enumerate() {
            let d = i64::from(digit.to_digit(10).unwrap_or(0));
            fraction_value += d * 10_i64.pow(SCALE - 1 - i as u32);
        }

        let minor = whole_value
            .checked_mul(FACTOR)
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or_else(overflow)?;

        Ok(Money(if negative { -minor } else { minor }))
    }

    /// Converts to a major-unit float for JSON wire payloads only.
    ///
    /// Arithmetic must stay on [`Money`]; this exists because the fiscal
    /// service expects `unitPrice` as a JSON number.
    pub fn to_major_f64(&self) -> f64 {
        self.0 as f64 / FACTOR as f64
    }

    /// Adds two amounts.
    pub fn checked_add(self, other: Money) -> CoreResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(CoreError::AmountOverflow { operation: "add" })
    }

    /// Subtracts `other` from this amount.
    pub fn checked_sub(self, other: Money) -> CoreResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(CoreError::AmountOverflow {
                operation: "subtract",
            })
    }

    /// Multiplies money by a quantity.
    pub fn multiply_quantity(self, qty: i64) -> CoreResult<Money> {
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or(CoreError::AmountOverflow {
                operation: "multiply",
            })
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let factor = FACTOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / factor, abs % factor)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fraction() {
        assert_eq!(Money::parse_decimal("p", "19990.00").unwrap().minor(), 1_999_000);
        assert_eq!(Money::parse_decimal("p", "10.5").unwrap().minor(), 1050);
        assert_eq!(Money::parse_decimal("p", "7").unwrap().minor(), 700);
        assert_eq!(Money::parse_decimal("p", ".25").unwrap().minor(), 25);
        assert_eq!(Money::parse_decimal("p", " 0.01 ").unwrap().minor(), 1);
    }

    #[test]
    fn test_parse_negative() {
        assert_eq!(Money::parse_decimal("p", "-4.20").unwrap().minor(), -420);
    }

    #[test]
    fn test_trailing_zeros_beyond_scale_accepted() {
        assert_eq!(Money::parse_decimal("p", "1.2300").unwrap().minor(), 123);
    }

    #[test]
    fn test_extra_precision_rejected_not_rounded() {
        let err = Money::parse_decimal("total_price", "1.005").unwrap_err();
        assert!(matches!(err, ValidationError::TooPrecise { scale: 2, .. }));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(Money::parse_decimal("p", "").is_err());
        assert!(Money::parse_decimal("p", "abc").is_err());
        assert!(Money::parse_decimal("p", "1,50").is_err());
        assert!(Money::parse_decimal("p", "1.2.3").is_err());
        assert!(Money::parse_decimal("p", "-").is_err());
        assert!(Money::parse_decimal("p", "99999999999999999999").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1099).to_string(), "10.99");
        assert_eq!(Money::from_minor(-550).to_string(), "-5.50");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
    }

    #[test]
    fn test_arithmetic() {
        let unit = Money::from_minor(299);
        assert_eq!(unit.multiply_quantity(3).unwrap().minor(), 897);
        assert_eq!(
            unit.multiply_quantity(2)
                .and_then(|m| m.checked_add(Money::from_minor(2)))
                .unwrap()
                .minor(),
            600
        );
        assert_eq!(unit.checked_sub(unit).unwrap().minor(), 0);
        assert!((unit.to_major_f64() - 2.99).abs() < f64::EPSILON);
    }

    #[test]
    fn test_arithmetic_overflow_is_an_error() {
        let huge = Money::from_minor(i64::MAX / 2);
        assert!(matches!(
            huge.multiply_quantity(3),
            Err(CoreError::AmountOverflow { operation: "multiply" })
        ));
        assert!(huge.checked_add(huge).is_ok());
        assert!(huge.checked_add(huge).unwrap().checked_add(huge).is_err());
        assert!(Money::from_minor(i64::MIN).checked_sub(Money::from_minor(1)).is_err());
    }
}
