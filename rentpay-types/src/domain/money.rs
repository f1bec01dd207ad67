//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;
use rentpay_rates::CurrencyCode;

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (cents, rappen, etc.)
/// to avoid floating-point precision issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: CurrencyCode,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: i64, currency: CurrencyCode) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a strictly positive Money value.
    pub fn positive(amount: i64, currency: CurrencyCode) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::NonPositiveAmount(amount));
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Checked addition - returns error if currencies don't match.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| DomainError::ValidationError("Amount overflow".into()))?;
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }

    /// Subtraction floored at zero - returns error if currencies don't match.
    pub fn saturating_sub(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        Ok(Money {
            amount: (self.amount - other.amount).max(0),
            currency: self.currency,
        })
    }

    fn ensure_same_currency(&self, other: Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.currency.symbol(),
            rentpay_rates::format_minor(self.amount, self.currency)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let money = Money::new(1000, CurrencyCode::EUR).unwrap();
        assert_eq!(money.amount(), 1000);
        assert_eq!(money.currency(), CurrencyCode::EUR);
    }

    #[test]
    fn test_negative_money_fails() {
        let result = Money::new(-100, CurrencyCode::EUR);
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_positive_rejects_zero() {
        let result = Money::positive(0, CurrencyCode::EUR);
        assert!(matches!(result, Err(DomainError::NonPositiveAmount(0))));
    }

    #[test]
    fn test_money_addition() {
        let a = Money::new(100, CurrencyCode::EUR).unwrap();
        let b = Money::new(50, CurrencyCode::EUR).unwrap();
        assert_eq!(a.checked_add(b).unwrap().amount(), 150);
    }

    #[test]
    fn test_currency_mismatch() {
        let eur = Money::new(100, CurrencyCode::EUR).unwrap();
        let chf = Money::new(50, CurrencyCode::CHF).unwrap();
        let result = eur.checked_add(chf);
        assert!(matches!(result, Err(DomainError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let a = Money::new(100, CurrencyCode::EUR).unwrap();
        let b = Money::new(150, CurrencyCode::EUR).unwrap();
        assert_eq!(a.saturating_sub(b).unwrap().amount(), 0);
    }

    #[test]
    fn test_money_display() {
        let money = Money::new(1050, CurrencyCode::EUR).unwrap();
        assert_eq!(format!("{}", money), "€10.50");
    }
}
