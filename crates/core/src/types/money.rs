//! Decimal money helpers.
//!
//! Prices, line-item snapshots and order totals are `rust_decimal::Decimal`
//! amounts in the currency's standard unit (dollars, not cents). Payment
//! processors want integer minor units, so conversion lives here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal places allowed on any monetary amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest storable amount in minor units. Amount columns are `NUMERIC(12, 2)`.
pub const MAX_MINOR_UNITS: i64 = 999_999_999_999;

/// Errors that can occur when converting monetary amounts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is negative.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount has more decimal places than the currency allows.
    #[error("amount must have at most {max} decimal places")]
    TooPrecise {
        /// Maximum allowed decimal places.
        max: u32,
    },
    /// The amount exceeds `MAX_MINOR_UNITS`.
    #[error("amount is too large")]
    Overflow,
}

/// Convert a decimal amount to integer minor units (e.g. cents).
///
/// # Errors
///
/// Returns `MoneyError::Negative` for negative amounts,
/// `MoneyError::TooPrecise` if the amount has more than two decimal places, and
/// `MoneyError::Overflow` if the result exceeds `MAX_MINOR_UNITS`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative);
    }

    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(MoneyError::TooPrecise { max: MONEY_SCALE });
    }

    let cents = normalized
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(MoneyError::Overflow)?;

    i64::try_from(cents)
        .ok()
        .filter(|minor| *minor <= MAX_MINOR_UNITS)
        .ok_or(MoneyError::Overflow)
}

/// Convert integer minor units (e.g. cents) back to a decimal amount.
#[must_use]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}

/// ISO 4217 currency codes accepted by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Lowercase code, as payment processor APIs expect it.
    #[must_use]
    pub const fn as_lower(&self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "eur" => Ok(Self::EUR),
            "gbp" => Ok(Self::GBP),
            "cad" => Ok(Self::CAD),
            "aud" => Ok(Self::AUD),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(Decimal::from_str("150.00").unwrap()), Ok(15000));
        assert_eq!(to_minor_units(Decimal::from_str("19.99").unwrap()), Ok(1999));
        assert_eq!(to_minor_units(Decimal::from_str("0.5").unwrap()), Ok(50));
        assert_eq!(to_minor_units(Decimal::ZERO), Ok(0));
    }

    #[test]
    fn test_to_minor_units_trailing_zeros_are_fine() {
        assert_eq!(to_minor_units(Decimal::from_str("12.5000").unwrap()), Ok(1250));
    }

    #[test]
    fn test_to_minor_units_rejects_fractions_of_a_cent() {
        assert_eq!(
            to_minor_units(Decimal::from_str("1.005").unwrap()),
            Err(MoneyError::TooPrecise { max: 2 })
        );
    }

    #[test]
    fn test_to_minor_units_rejects_negative() {
        assert_eq!(
            to_minor_units(Decimal::from_str("-1.00").unwrap()),
            Err(MoneyError::Negative)
        );
    }

    #[test]
    fn test_to_minor_units_caps_at_column_range() {
        assert_eq!(
            to_minor_units(Decimal::from_str("9999999999.99").unwrap()),
            Ok(MAX_MINOR_UNITS)
        );
        assert_eq!(
            to_minor_units(Decimal::from_str("10000000000.00").unwrap()),
            Err(MoneyError::Overflow)
        );
        assert_eq!(
            to_minor_units(Decimal::from_str("70000000000000000000000000000").unwrap()),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(from_minor_units(15000), Decimal::from_str("150.00").unwrap());
    }

    #[test]
    fn test_currency_code_parse() {
        assert_eq!(CurrencyCode::from_str("USD").unwrap(), CurrencyCode::USD);
        assert_eq!(CurrencyCode::from_str("eur").unwrap().as_lower(), "eur");
        assert!(CurrencyCode::from_str("xyz").is_err());
    }
}
