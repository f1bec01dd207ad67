//! Fee & conversion calculator.
//!
//! The one authoritative implementation. Client previews and link creation
//! both go through [`calculate`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::method::{Caller, MethodType, PaymentMethod};
use super::money::Money;
use super::payment::PaymentIntent;
use crate::error::DomainError;
use rentpay_rates::{ConversionRate, CurrencyCode, apply_percentage};

/// Result of a fee and conversion calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calculation {
    pub base: Money,
    pub fee: Money,
    /// `base + fee`, in the source currency
    pub total: Money,
    /// `total` in the settlement currency
    pub converted: Option<Money>,
    pub final_currency: CurrencyCode,
    pub rate: Option<Decimal>,
    pub fee_percentage: Decimal,
    pub method_type: MethodType,
    pub payment_intent: PaymentIntent,
}

impl Calculation {
    /// Amount the payer is charged, in `final_currency`.
    pub fn charged(&self) -> Money {
        self.converted.unwrap_or(self.total)
    }
}

/// Whether `method` needs a table rate to settle an amount in `currency`.
///
/// A method settling in the source currency converts at the identity rate.
pub fn needs_rate(method: &PaymentMethod, currency: CurrencyCode) -> bool {
    method.requires_conversion && method.settlement_currency != currency
}

/// Computes fee, total and optional conversion.
///
/// `rate` is the applicable rate for `currency -> settlement_currency` at
/// evaluation time, or `None` if the table has none.
pub fn calculate(
    base: Money,
    intent: PaymentIntent,
    method: &PaymentMethod,
    caller: Caller,
    rate: Option<&ConversionRate>,
) -> Result<Calculation, DomainError> {
    method.ensure_available(caller)?;
    if base.amount() <= 0 {
        return Err(DomainError::NonPositiveAmount(base.amount()));
    }

    let currency = base.currency();
    let fee_percentage = method.fee_percentage_for(intent);
    let fee = Money::new(apply_percentage(base.amount(), fee_percentage)?, currency)?;
    let total = base.checked_add(fee)?;

    let (converted, final_currency, applied_rate) = if method.requires_conversion {
        let target = method.settlement_currency;
        if needs_rate(method, currency) {
            let rate = rate
                .filter(|r| r.from_currency == currency && r.to_currency == target)
                .ok_or(DomainError::NoApplicableRate {
                    from: currency,
                    to: target,
                })?;
            let converted = Money::new(rate.convert(total.amount())?, target)?;
            (Some(converted), target, Some(rate.rate))
        } else {
            (Some(total), target, Some(Decimal::ONE))
        }
    } else {
        (None, currency, None)
    };

    Ok(Calculation {
        base,
        fee,
        total,
        converted,
        final_currency,
        rate: applied_rate,
        fee_percentage,
        method_type: method.method_type,
        payment_intent: intent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn card(fee: Decimal, requires_conversion: bool) -> PaymentMethod {
        PaymentMethod {
            method_type: MethodType::VisaMastercard,
            display_name: "Visa / Mastercard".into(),
            fee_percentage: fee,
            settlement_currency: CurrencyCode::CHF,
            requires_conversion,
            is_enabled: true,
            admin_only: false,
            sort_order: 1,
            updated_at: Utc::now(),
        }
    }

    fn eur(amount: i64) -> Money {
        Money::new(amount, CurrencyCode::EUR).unwrap()
    }

    fn eur_chf(rate: Decimal) -> ConversionRate {
        ConversionRate::new(
            CurrencyCode::EUR,
            CurrencyCode::CHF,
            rate,
            Utc::now() - Duration::days(1),
            "manual",
        )
        .unwrap()
    }

    #[test]
    fn test_fee_and_conversion_scenario() {
        let method = card(Decimal::new(3, 0), true);
        let rate = eur_chf(Decimal::new(103, 2));
        let calc = calculate(
            eur(100_000),
            PaymentIntent::ClientPayment,
            &method,
            Caller::Client,
            Some(&rate),
        )
        .unwrap();

        assert_eq!(calc.fee.amount(), 3_000);
        assert_eq!(calc.total.amount(), 103_000);
        assert_eq!(calc.converted.unwrap().amount(), 106_090);
        assert_eq!(calc.converted.unwrap().currency(), CurrencyCode::CHF);
        assert_eq!(calc.final_currency, CurrencyCode::CHF);
        assert_eq!(calc.rate, Some(Decimal::new(103, 2)));
    }

    #[test]
    fn test_security_deposit_never_has_fee() {
        for fee in [Decimal::ZERO, Decimal::new(29, 1), Decimal::new(35, 1), Decimal::ONE_HUNDRED] {
            for amount in [1, 99, 150_000, 9_999_999] {
                let calc = calculate(
                    eur(amount),
                    PaymentIntent::SecurityDeposit,
                    &card(fee, false),
                    Caller::Client,
                    None,
                )
                .unwrap();
                assert_eq!(calc.fee.amount(), 0);
                assert_eq!(calc.total.amount(), amount);
            }
        }
    }

    #[test]
    fn test_missing_rate_fails() {
        let method = card(Decimal::new(3, 0), true);
        let result = calculate(
            eur(10_000),
            PaymentIntent::BalancePayment,
            &method,
            Caller::Client,
            None,
        );
        assert!(matches!(
            result,
            Err(DomainError::NoApplicableRate {
                from: CurrencyCode::EUR,
                to: CurrencyCode::CHF
            })
        ));
    }

    #[test]
    fn test_rate_for_other_pair_is_not_used() {
        let method = card(Decimal::new(3, 0), true);
        let wrong = ConversionRate::new(
            CurrencyCode::USD,
            CurrencyCode::CHF,
            Decimal::new(9, 1),
            Utc::now(),
            "manual",
        )
        .unwrap();
        assert!(
            calculate(
                eur(10_000),
                PaymentIntent::ClientPayment,
                &method,
                Caller::Client,
                Some(&wrong)
            )
            .is_err()
        );
    }

    #[test]
    fn test_settlement_in_source_currency_uses_identity_rate() {
        let method = card(Decimal::new(3, 0), true);
        let chf = Money::new(10_000, CurrencyCode::CHF).unwrap();
        let calc = calculate(chf, PaymentIntent::ClientPayment, &method, Caller::Client, None)
            .unwrap();
        assert_eq!(calc.converted.unwrap().amount(), 10_300);
        assert_eq!(calc.rate, Some(Decimal::ONE));
    }

    #[test]
    fn test_no_conversion_keeps_source_currency() {
        let calc = calculate(
            eur(12_345),
            PaymentIntent::ClientPayment,
            &card(Decimal::new(29, 1), false),
            Caller::Client,
            None,
        )
        .unwrap();
        // 12345 * 2.9% = 358.005 -> 358
        assert_eq!(calc.fee.amount(), 358);
        assert!(calc.converted.is_none());
        assert_eq!(calc.final_currency, CurrencyCode::EUR);
        assert_eq!(calc.charged().amount(), 12_703);
    }

    #[test]
    fn test_disabled_method_rejected() {
        let mut method = card(Decimal::new(3, 0), false);
        method.is_enabled = false;
        assert!(matches!(
            calculate(
                eur(100),
                PaymentIntent::ClientPayment,
                &method,
                Caller::Admin,
                None
            ),
            Err(DomainError::MethodDisabled(_))
        ));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let method = card(Decimal::new(3, 0), false);
        assert!(matches!(
            calculate(
                eur(0),
                PaymentIntent::ClientPayment,
                &method,
                Caller::Client,
                None
            ),
            Err(DomainError::NonPositiveAmount(0))
        ));
    }
}
