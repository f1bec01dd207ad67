//! Error types for the rental payment core.

use crate::domain::MethodType;
use rentpay_rates::{CurrencyCode, RateError};

/// Domain-level errors (business logic violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount must be greater than zero, got {0}")]
    NonPositiveAmount(i64),

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        got: CurrencyCode,
    },

    #[error("Unknown payment method: {0}")]
    UnknownMethod(String),

    #[error("Payment method {0} is not available")]
    MethodDisabled(MethodType),

    #[error("No applicable conversion rate for {from} -> {to}")]
    NoApplicableRate { from: CurrencyCode, to: CurrencyCode },

    #[error("Capture of {requested} exceeds authorized amount {authorized}")]
    CaptureExceedsAuthorization { authorized: i64, requested: i64 },

    #[error("A capture reason is required")]
    MissingCaptureReason,

    #[error("Invalid {entity} transition: current status is {current}, requested {requested}")]
    InvalidTransition {
        entity: &'static str,
        current: String,
        requested: String,
    },

    #[error("Authorization expiry must be between 1 and 8760 hours, got {0}")]
    ExpiryOutOfRange(i64),

    #[error("{method} payments do not support {operation}")]
    UnsupportedMethodFlow {
        method: MethodType,
        operation: &'static str,
    },

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unknown gateway transaction: {0}")]
    UnknownTransaction(String),

    /// Part of a reconciliation would have landed without the rest.
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),
}

/// Errors from the external payment gateway.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The gateway refused the request; the reason is passed on verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown gateway session: {0}")]
    UnknownSession(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict {
        message: String,
        current: Option<String>,
        requested: Option<String>,
    },

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
            current: None,
            requested: None,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition {
                ref current,
                ref requested,
                ..
            } => AppError::Conflict {
                current: Some(current.clone()),
                requested: Some(requested.clone()),
                message: err.to_string(),
            },
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::UnknownTransaction(reference) => {
                AppError::NotFound(format!("Unknown gateway transaction: {}", reference))
            }
            RepoError::Conflict(e) => AppError::conflict(e),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Inconsistent(e) => AppError::Internal(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(reason) => AppError::Gateway(reason),
            GatewayError::Unavailable(e) => AppError::Gateway(format!(
                "Payment gateway unavailable, try again or contact support ({})",
                e
            )),
            GatewayError::UnknownSession(s) => AppError::NotFound(format!("Gateway session {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_maps_to_conflict() {
        let err: AppError = RepoError::Domain(DomainError::InvalidTransition {
            entity: "payment",
            current: "paid".into(),
            requested: "cancelled".into(),
        })
        .into();
        match err {
            AppError::Conflict {
                current, requested, ..
            } => {
                assert_eq!(current.as_deref(), Some("paid"));
                assert_eq!(requested.as_deref(), Some("cancelled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_gateway_rejection_is_verbatim() {
        let err: AppError = GatewayError::Rejected("Card number invalid".into()).into();
        assert!(matches!(err, AppError::Gateway(ref r) if r == "Card number invalid"));
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err: AppError = DomainError::CaptureExceedsAuthorization {
            authorized: 100,
            requested: 101,
        }
        .into();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
