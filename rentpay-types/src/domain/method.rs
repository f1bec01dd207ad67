//! Payment method registry model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::payment::PaymentIntent;
use crate::error::DomainError;
use rentpay_rates::CurrencyCode;

/// Configured payment method identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    #[serde(alias = "card-visa-mastercard")]
    VisaMastercard,
    #[serde(alias = "card-amex")]
    Amex,
    BankTransfer,
    Manual,
}

impl MethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodType::VisaMastercard => "visa_mastercard",
            MethodType::Amex => "amex",
            MethodType::BankTransfer => "bank_transfer",
            MethodType::Manual => "manual",
        }
    }

    pub fn all() -> &'static [MethodType] {
        &[
            MethodType::VisaMastercard,
            MethodType::Amex,
            MethodType::BankTransfer,
            MethodType::Manual,
        ]
    }

    /// Behavioural family of this method.
    pub fn kind(&self) -> MethodKind {
        match self {
            MethodType::VisaMastercard => MethodKind::Card(CardNetwork::VisaMastercard),
            MethodType::Amex => MethodKind::Card(CardNetwork::Amex),
            MethodType::BankTransfer => MethodKind::BankTransfer,
            MethodType::Manual => MethodKind::Manual,
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self.kind(), MethodKind::Card(_))
    }
}

impl std::fmt::Display for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MethodType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visa_mastercard" | "card-visa-mastercard" => Ok(MethodType::VisaMastercard),
            "amex" | "card-amex" => Ok(MethodType::Amex),
            "bank_transfer" => Ok(MethodType::BankTransfer),
            "manual" => Ok(MethodType::Manual),
            other => Err(DomainError::UnknownMethod(other.to_string())),
        }
    }
}

/// Card networks routed through the external gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardNetwork {
    VisaMastercard,
    Amex,
}

/// Closed set of method behaviours. Link creation and confirmation
/// dispatch on this, never on the method string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Card(CardNetwork),
    BankTransfer,
    Manual,
}

/// Who is asking. Admin-only methods are hidden from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Client,
    Admin,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        matches!(self, Caller::Admin)
    }
}

/// A configured payment method.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethod {
    pub method_type: MethodType,
    #[schema(example = "Visa / Mastercard")]
    pub display_name: String,
    /// Percentage fee added on top of the base amount
    #[schema(value_type = String, example = "3.00")]
    pub fee_percentage: Decimal,
    pub settlement_currency: CurrencyCode,
    pub requires_conversion: bool,
    pub is_enabled: bool,
    pub admin_only: bool,
    pub sort_order: i32,
    pub updated_at: DateTime<Utc>,
}

/// Admin mutation of a payment method. Methods are never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MethodUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "2.90")]
    pub fee_percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
}

impl PaymentMethod {
    pub fn kind(&self) -> MethodKind {
        self.method_type.kind()
    }

    /// Fee percentage applied for `intent`.
    ///
    /// Security deposits are holds, never charged a fee.
    pub fn fee_percentage_for(&self, intent: PaymentIntent) -> Decimal {
        match intent {
            PaymentIntent::SecurityDeposit => Decimal::ZERO,
            PaymentIntent::ClientPayment | PaymentIntent::BalancePayment => self.fee_percentage,
        }
    }

    pub fn is_available_to(&self, caller: Caller) -> bool {
        self.is_enabled && (!self.admin_only || caller.is_admin())
    }

    pub fn ensure_available(&self, caller: Caller) -> Result<(), DomainError> {
        if self.is_available_to(caller) {
            Ok(())
        } else {
            Err(DomainError::MethodDisabled(self.method_type))
        }
    }

    /// Applies an admin update in place.
    pub fn apply_update(
        &mut self,
        update: &MethodUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if let Some(fee) = update.fee_percentage {
            if fee < Decimal::ZERO {
                return Err(DomainError::ValidationError(
                    "Fee percentage cannot be negative".into(),
                ));
            }
            self.fee_percentage = fee;
        }
        if let Some(enabled) = update.is_enabled {
            self.is_enabled = enabled;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Filters and orders methods for display: enabled only, admin-only
/// hidden from clients, ascending `sort_order`.
pub fn list_enabled(methods: &[PaymentMethod], for_admin: bool) -> Vec<PaymentMethod> {
    let caller = if for_admin { Caller::Admin } else { Caller::Client };
    let mut out: Vec<_> = methods
        .iter()
        .filter(|m| m.is_available_to(caller))
        .cloned()
        .collect();
    out.sort_by_key(|m| m.sort_order);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(method_type: MethodType, sort_order: i32, admin_only: bool) -> PaymentMethod {
        PaymentMethod {
            method_type,
            display_name: method_type.to_string(),
            fee_percentage: Decimal::new(3, 0),
            settlement_currency: CurrencyCode::CHF,
            requires_conversion: false,
            is_enabled: true,
            admin_only,
            sort_order,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_method_type_parse_aliases() {
        assert_eq!(
            "card-visa-mastercard".parse::<MethodType>().unwrap(),
            MethodType::VisaMastercard
        );
        assert_eq!("amex".parse::<MethodType>().unwrap(), MethodType::Amex);
        assert!(matches!(
            "paypal".parse::<MethodType>(),
            Err(DomainError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_method_kind_dispatch() {
        assert_eq!(
            MethodType::Amex.kind(),
            MethodKind::Card(CardNetwork::Amex)
        );
        assert_eq!(MethodType::BankTransfer.kind(), MethodKind::BankTransfer);
        assert!(!MethodType::Manual.is_card());
    }

    #[test]
    fn test_security_deposit_has_no_fee() {
        let m = method(MethodType::VisaMastercard, 1, false);
        assert_eq!(
            m.fee_percentage_for(PaymentIntent::SecurityDeposit),
            Decimal::ZERO
        );
        assert_eq!(
            m.fee_percentage_for(PaymentIntent::ClientPayment),
            Decimal::new(3, 0)
        );
    }

    #[test]
    fn test_list_enabled_filters_and_orders() {
        let mut disabled = method(MethodType::Amex, 0, false);
        disabled.is_enabled = false;
        let methods = vec![
            method(MethodType::BankTransfer, 3, false),
            method(MethodType::Manual, 4, true),
            disabled,
            method(MethodType::VisaMastercard, 1, false),
        ];

        let client: Vec<_> = list_enabled(&methods, false)
            .into_iter()
            .map(|m| m.method_type)
            .collect();
        assert_eq!(
            client,
            vec![MethodType::VisaMastercard, MethodType::BankTransfer]
        );

        let admin = list_enabled(&methods, true);
        assert_eq!(admin.len(), 3);
        assert_eq!(admin[2].method_type, MethodType::Manual);
    }

    #[test]
    fn test_admin_only_method_rejected_for_client() {
        let m = method(MethodType::Manual, 4, true);
        assert!(matches!(
            m.ensure_available(Caller::Client),
            Err(DomainError::MethodDisabled(MethodType::Manual))
        ));
        assert!(m.ensure_available(Caller::Admin).is_ok());
    }

    #[test]
    fn test_apply_update_rejects_negative_fee() {
        let mut m = method(MethodType::VisaMastercard, 1, false);
        let update = MethodUpdate {
            fee_percentage: Some(Decimal::new(-1, 0)),
            is_enabled: None,
        };
        assert!(m.apply_update(&update, Utc::now()).is_err());
        assert_eq!(m.fee_percentage, Decimal::new(3, 0));
    }
}
