//! Fixed-point monetary amounts.
//!
//! All money in Kasuwa is decimal arithmetic via [`rust_decimal::Decimal`] -
//! never floating point. Arithmetic is checked: mixing currencies or
//! overflowing an amount is an error, not a silent wrap.

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors from monetary arithmetic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Two amounts in different currencies were combined.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },
    /// The amount overflowed the decimal range.
    #[error("amount overflow")]
    Overflow,
    /// The amount has sub-minor-unit precision (e.g. fractions of a kobo).
    #[error("amount {0} is not representable in minor units")]
    SubMinorPrecision(Decimal),
}

/// A monetary amount with its currency.
///
/// Amounts are held in the currency's standard unit (naira, not kobo).
/// Use [`Money::to_minor_units`] at the payment-gateway boundary, which
/// expects amounts in the minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::CurrencyMismatch` if the currencies differ, or
    /// `MoneyError::Overflow` if the sum is out of range.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Multiply a unit price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the product is out of range.
    pub fn times(self, quantity: u32) -> Result<Self, MoneyError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Convert to the currency's minor unit (kobo for NGN, cents for USD).
    ///
    /// Payment processors take amounts in minor units.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::SubMinorPrecision` if the amount carries more
    /// precision than the minor unit, or `MoneyError::Overflow` if it does
    /// not fit in an `i64`.
    pub fn to_minor_units(self) -> Result<i64, MoneyError> {
        let scaled = self
            .amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?;
        if scaled.fract() != Decimal::ZERO {
            return Err(MoneyError::SubMinorPrecision(self.amount));
        }
        scaled.to_i64().ok_or(MoneyError::Overflow)
    }

    /// Whether the amount is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.currency.symbol(), self.amount)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    NGN,
    USD,
    EUR,
    GBP,
}

impl CurrencyCode {
    /// The currency's display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NGN => "\u{20a6}",
            Self::USD => "$",
            Self::EUR => "\u{20ac}",
            Self::GBP => "\u{a3}",
        }
    }

    /// The ISO 4217 alphabetic code, as sent to the payment gateway.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NGN => "NGN",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ngn(mantissa: i64, scale: u32) -> Money {
        Money::new(Decimal::new(mantissa, scale), CurrencyCode::NGN)
    }

    #[test]
    fn test_checked_add_same_currency() {
        let sum = ngn(2000, 2).checked_add(ngn(1050, 2)).unwrap();
        assert_eq!(sum.amount, Decimal::new(3050, 2));
    }

    #[test]
    fn test_checked_add_currency_mismatch() {
        let a = ngn(100, 2);
        let b = Money::new(Decimal::ONE, CurrencyCode::USD);
        assert!(matches!(
            a.checked_add(b),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_times() {
        assert_eq!(ngn(2000, 2).times(2).unwrap().amount, Decimal::new(4000, 2));
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(ngn(11_000, 2).to_minor_units().unwrap(), 11_000);
    }

    #[test]
    fn test_to_minor_units_rejects_sub_kobo() {
        // 1.005 carries half a kobo
        assert!(matches!(
            ngn(1005, 3).to_minor_units(),
            Err(MoneyError::SubMinorPrecision(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(ngn(12_345, 1).to_string(), "\u{20a6}1234.50");
    }
}
