//! Currency codes and time-stamped conversion rates.
//!
//! Currencies are defined declaratively with a macro that generates the
//! runtime `CurrencyCode` enum together with its metadata, parsing and
//! display impls.
//!
//! # Adding a New Currency
//! Add a line to the `define_currencies!` invocation:
//! ```ignore
//! define_currencies! {
//!     // ... existing currencies ...
//!     SEK => ("SEK", "kr", "öre", 100),
//! }
//! ```
//!
//! # Example
//! ```
//! use chrono::{TimeZone, Utc};
//! use rust_decimal::Decimal;
//! use rentpay_rates::{ConversionRate, CurrencyCode, RateTable};
//!
//! let mut table = RateTable::new();
//! table
//!     .insert(ConversionRate::new(
//!         CurrencyCode::EUR,
//!         CurrencyCode::CHF,
//!         Decimal::new(103, 2),
//!         Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!         "manual",
//!     ).unwrap());
//!
//! let rate = table
//!     .applicable(CurrencyCode::EUR, CurrencyCode::CHF, Utc::now())
//!     .unwrap();
//! assert_eq!(rate.convert(103_000).unwrap(), 106_090);
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while building or applying conversion rates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("Conversion rate must be positive, got {0}")]
    NonPositiveRate(Decimal),

    #[error("Conversion rate needs two distinct currencies, got {0} -> {0}")]
    SameCurrency(CurrencyCode),

    #[error("Amount overflow while converting {0} minor units")]
    Overflow(i64),
}

// ─────────────────────────────────────────────────────────────────────────────
// THE MACRO: Defines CurrencyCode and its metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Macro to define currencies with auto-generated metadata and parsing.
///
/// # Syntax
/// ```ignore
/// define_currencies! {
///     CurrencyName => ("CODE", "SYMBOL", "minor_unit", minor_per_major),
/// }
/// ```
#[macro_export]
macro_rules! define_currencies {
    (
        $(
            $name:ident => ($code:literal, $symbol:literal, $minor:literal, $minor_per_major:expr)
        ),* $(,)?
    ) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            serde::Serialize,
            serde::Deserialize,
            utoipa::ToSchema,
        )]
        #[serde(rename_all = "UPPERCASE")]
        pub enum CurrencyCode {
            $($name),*
        }

        impl CurrencyCode {
            pub fn code(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $code),*
                }
            }

            pub fn symbol(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $symbol),*
                }
            }

            pub fn minor_unit(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $minor),*
                }
            }

            pub fn minor_units_per_major(&self) -> i64 {
                match self {
                    $(CurrencyCode::$name => $minor_per_major),*
                }
            }

            pub fn all() -> &'static [CurrencyCode] {
                &[$(CurrencyCode::$name),*]
            }
        }

        impl std::fmt::Display for CurrencyCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.code())
            }
        }

        impl std::str::FromStr for CurrencyCode {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_uppercase().as_str() {
                    $($code => Ok(CurrencyCode::$name),)*
                    _ => Err(format!("Unknown currency: {}", s)),
                }
            }
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// CURRENCY DEFINITIONS - Add new currencies here!
// ─────────────────────────────────────────────────────────────────────────────

define_currencies! {
    EUR => ("EUR", "€", "cent", 100),
    CHF => ("CHF", "CHF ", "rappen", 100),
    USD => ("USD", "$", "cent", 100),
    GBP => ("GBP", "£", "penny", 100),
}

// ─────────────────────────────────────────────────────────────────────────────
// Minor-unit arithmetic
// ─────────────────────────────────────────────────────────────────────────────

/// Rounds a minor-unit quantity to a whole number of minor units, half-up.
pub fn round_minor(value: Decimal) -> Option<i64> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Returns `percent`% of `amount` (minor units), rounded half-up.
///
/// `apply_percentage(100_000, 3)` is `3_000`.
pub fn apply_percentage(amount: i64, percent: Decimal) -> Result<i64, RateError> {
    let scaled = Decimal::from(amount)
        .checked_mul(percent)
        .ok_or(RateError::Overflow(amount))?
        / Decimal::ONE_HUNDRED;
    round_minor(scaled).ok_or(RateError::Overflow(amount))
}

/// Multiplies `amount` (minor units) by `rate`, rounded half-up.
pub fn convert_minor(amount: i64, rate: Decimal) -> Result<i64, RateError> {
    if rate <= Decimal::ZERO {
        return Err(RateError::NonPositiveRate(rate));
    }
    let converted = Decimal::from(amount)
        .checked_mul(rate)
        .ok_or(RateError::Overflow(amount))?;
    round_minor(converted).ok_or(RateError::Overflow(amount))
}

/// Formats minor units as a major-unit string (`106090` -> `"1060.90"`).
pub fn format_minor(amount: i64, currency: CurrencyCode) -> String {
    let per_major = currency.minor_units_per_major();
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs() as i64;
    format!("{}{}.{:02}", sign, abs / per_major, abs % per_major)
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion rates
// ─────────────────────────────────────────────────────────────────────────────

/// A time-stamped multiplier from one currency to another.
///
/// The rate applicable at a given instant is the one with the latest
/// `effective_date` not after that instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ConversionRate {
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    /// Units of `to_currency` per unit of `from_currency`
    #[schema(value_type = String, example = "1.03")]
    pub rate: Decimal,
    pub effective_date: DateTime<Utc>,
    /// Where the rate came from (e.g. "manual", "ecb")
    pub source: String,
}

impl ConversionRate {
    /// Creates a validated conversion rate.
    pub fn new(
        from_currency: CurrencyCode,
        to_currency: CurrencyCode,
        rate: Decimal,
        effective_date: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Result<Self, RateError> {
        if rate <= Decimal::ZERO {
            return Err(RateError::NonPositiveRate(rate));
        }
        if from_currency == to_currency {
            return Err(RateError::SameCurrency(from_currency));
        }
        Ok(Self {
            from_currency,
            to_currency,
            rate,
            effective_date,
            source: source.into(),
        })
    }

    /// Whether this rate may be used at `at`.
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_date <= at
    }

    /// Converts an amount in minor units of `from_currency`.
    pub fn convert(&self, amount: i64) -> Result<i64, RateError> {
        convert_minor(amount, self.rate)
    }
}

impl fmt::Display for ConversionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "1 {} = {} {} (from {})",
            self.from_currency,
            self.rate,
            self.to_currency,
            self.effective_date.to_rfc3339()
        )
    }
}

/// Picks the applicable rate for a currency pair out of `rates`.
///
/// On equal effective dates the later entry wins, matching "most recently
/// recorded" semantics of the rate table.
pub fn select_applicable<'a, I>(
    rates: I,
    from: CurrencyCode,
    to: CurrencyCode,
    at: DateTime<Utc>,
) -> Option<&'a ConversionRate>
where
    I: IntoIterator<Item = &'a ConversionRate>,
{
    rates
        .into_iter()
        .filter(|r| r.from_currency == from && r.to_currency == to && r.is_effective_at(at))
        .fold(None, |best: Option<&ConversionRate>, r| match best {
            Some(b) if b.effective_date > r.effective_date => Some(b),
            _ => Some(r),
        })
}

/// In-memory conversion rate table.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: Vec<ConversionRate>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rate: ConversionRate) {
        self.rates.push(rate);
    }

    pub fn applicable(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        at: DateTime<Utc>,
    ) -> Option<&ConversionRate> {
        select_applicable(&self.rates, from, to, at)
    }

    /// All rates for a pair, newest effective date first.
    pub fn history(&self, from: CurrencyCode, to: CurrencyCode) -> Vec<ConversionRate> {
        let mut out: Vec<_> = self
            .rates
            .iter()
            .filter(|r| r.from_currency == from && r.to_currency == to)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.effective_date.cmp(&a.effective_date));
        out
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn eur_chf(rate: Decimal, at: DateTime<Utc>) -> ConversionRate {
        ConversionRate::new(CurrencyCode::EUR, CurrencyCode::CHF, rate, at, "manual").unwrap()
    }

    #[test]
    fn test_currency_code_parse() {
        assert_eq!("EUR".parse::<CurrencyCode>().unwrap(), CurrencyCode::EUR);
        assert_eq!("chf".parse::<CurrencyCode>().unwrap(), CurrencyCode::CHF);
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_currency_code_display() {
        assert_eq!(CurrencyCode::CHF.to_string(), "CHF");
        assert_eq!(CurrencyCode::all().len(), 4);
    }

    #[test]
    fn test_apply_percentage_rounds_half_up() {
        assert_eq!(apply_percentage(100_000, Decimal::new(3, 0)).unwrap(), 3_000);
        // 150 * 3% = 4.5 -> 5
        assert_eq!(apply_percentage(150, Decimal::new(3, 0)).unwrap(), 5);
        // 50 * 3% = 1.5 -> 2
        assert_eq!(apply_percentage(50, Decimal::new(3, 0)).unwrap(), 2);
        // 10 * 2.9% = 0.29 -> 0
        assert_eq!(apply_percentage(10, Decimal::new(29, 1)).unwrap(), 0);
    }

    #[test]
    fn test_convert_minor() {
        assert_eq!(convert_minor(103_000, Decimal::new(103, 2)).unwrap(), 106_090);
        assert_eq!(convert_minor(1, Decimal::new(5, 1)).unwrap(), 1);
        assert!(matches!(
            convert_minor(100, Decimal::ZERO),
            Err(RateError::NonPositiveRate(_))
        ));
    }

    #[test]
    fn test_rate_validation() {
        let zero = ConversionRate::new(
            CurrencyCode::EUR,
            CurrencyCode::CHF,
            Decimal::ZERO,
            jan(1),
            "manual",
        );
        assert!(matches!(zero, Err(RateError::NonPositiveRate(_))));

        let same = ConversionRate::new(
            CurrencyCode::EUR,
            CurrencyCode::EUR,
            Decimal::ONE,
            jan(1),
            "manual",
        );
        assert!(matches!(same, Err(RateError::SameCurrency(CurrencyCode::EUR))));
    }

    #[test]
    fn test_applicable_picks_latest_effective_not_after_now() {
        let mut table = RateTable::new();
        table.insert(eur_chf(Decimal::new(101, 2), jan(1)));
        table.insert(eur_chf(Decimal::new(103, 2), jan(10)));
        table.insert(eur_chf(Decimal::new(110, 2), jan(20)));

        let rate = table
            .applicable(CurrencyCode::EUR, CurrencyCode::CHF, jan(15))
            .unwrap();
        assert_eq!(rate.rate, Decimal::new(103, 2));

        let rate = table
            .applicable(CurrencyCode::EUR, CurrencyCode::CHF, jan(20))
            .unwrap();
        assert_eq!(rate.rate, Decimal::new(110, 2));
    }

    #[test]
    fn test_no_applicable_rate_before_first_effective_date() {
        let mut table = RateTable::new();
        table.insert(eur_chf(Decimal::new(103, 2), jan(10)));

        assert!(
            table
                .applicable(CurrencyCode::EUR, CurrencyCode::CHF, jan(10) - Duration::seconds(1))
                .is_none()
        );
        assert!(
            table
                .applicable(CurrencyCode::CHF, CurrencyCode::EUR, jan(11))
                .is_none()
        );
    }

    #[test]
    fn test_history_newest_first() {
        let mut table = RateTable::new();
        table.insert(eur_chf(Decimal::new(101, 2), jan(1)));
        table.insert(eur_chf(Decimal::new(103, 2), jan(10)));

        let history = table.history(CurrencyCode::EUR, CurrencyCode::CHF);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].effective_date, jan(10));
    }

    #[test]
    fn test_format_minor() {
        assert_eq!(format_minor(106_090, CurrencyCode::CHF), "1060.90");
        assert_eq!(format_minor(-5, CurrencyCode::EUR), "-0.05");
    }
}
