//! Security deposit authorization (refundable card hold).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::booking::BookingId;
use super::id::uuid_id;
use super::payment::PaymentId;
use crate::error::DomainError;
use rentpay_rates::CurrencyCode;

uuid_id! {
    /// Unique identifier for a SecurityDepositAuthorization.
    AuthorizationId
}

/// Longest hold a card network will keep open: one year.
pub const MAX_AUTHORIZATION_HOURS: i64 = 8760;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Authorized,
    Released,
    Captured,
    Expired,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Authorized => "authorized",
            DepositStatus::Released => "released",
            DepositStatus::Captured => "captured",
            DepositStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositStatus::Released | DepositStatus::Captured | DepositStatus::Expired
        )
    }

    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        use DepositStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized)
                | (Pending, Expired)
                | (Authorized, Released)
                | (Authorized, Captured)
                | (Authorized, Expired)
        )
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DepositStatus::Pending),
            "authorized" => Ok(DepositStatus::Authorized),
            "released" => Ok(DepositStatus::Released),
            "captured" => Ok(DepositStatus::Captured),
            "expired" => Ok(DepositStatus::Expired),
            other => Err(DomainError::ValidationError(format!(
                "Unknown security deposit status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecurityDepositAuthorization {
    pub id: AuthorizationId,
    pub booking_id: BookingId,
    /// Card-authorization payment carrying the hold
    pub payment_id: Option<PaymentId>,
    /// Held amount in minor units
    pub amount: i64,
    pub currency: CurrencyCode,
    pub status: DepositStatus,
    pub expires_in_hours: i64,
    pub authorized_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub captured_amount: Option<i64>,
    pub capture_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a confirm call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Authorized,
    AlreadyAuthorized,
}

/// Result of a release call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyReleased,
}

impl SecurityDepositAuthorization {
    /// Creates a `pending` hold request.
    pub fn request(
        booking_id: BookingId,
        amount: i64,
        currency: CurrencyCode,
        expires_in_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::NonPositiveAmount(amount));
        }
        if !(1..=MAX_AUTHORIZATION_HOURS).contains(&expires_in_hours) {
            return Err(DomainError::ExpiryOutOfRange(expires_in_hours));
        }
        Ok(Self {
            id: AuthorizationId::new(),
            booking_id,
            payment_id: None,
            amount,
            currency,
            status: DepositStatus::Pending,
            expires_in_hours,
            authorized_at: None,
            expires_at: now + Duration::hours(expires_in_hours),
            released_at: None,
            captured_at: None,
            captured_amount: None,
            capture_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Status as seen at `now`, with elapsed holds read as expired.
    pub fn status_at(&self, now: DateTime<Utc>) -> DepositStatus {
        match self.status {
            DepositStatus::Pending | DepositStatus::Authorized if self.expires_at <= now => {
                DepositStatus::Expired
            }
            status => status,
        }
    }

    pub fn as_seen_at(&self, now: DateTime<Utc>) -> SecurityDepositAuthorization {
        let mut seen = self.clone();
        seen.status = self.status_at(now);
        seen
    }

    fn conflict(&self, current: DepositStatus, requested: DepositStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "security deposit",
            current: current.to_string(),
            requested: requested.to_string(),
        }
    }

    /// Gateway confirmed the hold. The expiry window restarts at `at`.
    pub fn confirm(&mut self, at: DateTime<Utc>) -> Result<ConfirmOutcome, DomainError> {
        match self.status {
            DepositStatus::Authorized => Ok(ConfirmOutcome::AlreadyAuthorized),
            DepositStatus::Pending => {
                self.status = DepositStatus::Authorized;
                self.authorized_at = Some(at);
                self.expires_at = at + Duration::hours(self.expires_in_hours);
                self.updated_at = at;
                Ok(ConfirmOutcome::Authorized)
            }
            other => Err(self.conflict(other, DepositStatus::Authorized)),
        }
    }

    /// Releases the hold. Releasing twice is a no-op.
    pub fn release(&mut self, now: DateTime<Utc>) -> Result<ReleaseOutcome, DomainError> {
        match self.status_at(now) {
            DepositStatus::Released => Ok(ReleaseOutcome::AlreadyReleased),
            DepositStatus::Authorized => {
                self.status = DepositStatus::Released;
                self.released_at = Some(now);
                self.updated_at = now;
                Ok(ReleaseOutcome::Released)
            }
            other => Err(self.conflict(other, DepositStatus::Released)),
        }
    }

    /// Checks a capture without mutating anything.
    pub fn check_capture(
        &self,
        amount: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let current = self.status_at(now);
        if current != DepositStatus::Authorized {
            return Err(self.conflict(current, DepositStatus::Captured));
        }
        if reason.trim().is_empty() {
            return Err(DomainError::MissingCaptureReason);
        }
        if amount <= 0 {
            return Err(DomainError::NonPositiveAmount(amount));
        }
        if amount > self.amount {
            return Err(DomainError::CaptureExceedsAuthorization {
                authorized: self.amount,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Converts part or all of the hold into a charge.
    pub fn capture(
        &mut self,
        amount: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.check_capture(amount, reason, now)?;
        self.status = DepositStatus::Captured;
        self.captured_at = Some(now);
        self.captured_amount = Some(amount);
        self.capture_reason = Some(reason.trim().to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Persists an elapsed hold as expired.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_terminal() || self.status_at(now) != DepositStatus::Expired {
            return Err(self.conflict(self.status_at(now), DepositStatus::Expired));
        }
        self.status = DepositStatus::Expired;
        self.updated_at = now;
        Ok(())
    }
}

fn precedence(status: DepositStatus) -> u8 {
    match status {
        DepositStatus::Authorized => 2,
        DepositStatus::Captured | DepositStatus::Released => 1,
        DepositStatus::Pending | DepositStatus::Expired => 0,
    }
}

/// Picks the booking's current authorization among retries:
/// authorized, then captured or released, then the most recently created.
pub fn current_authorization(
    authorizations: &[SecurityDepositAuthorization],
) -> Option<&SecurityDepositAuthorization> {
    authorizations
        .iter()
        .max_by_key(|a| (precedence(a.status), a.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(hours: i64) -> SecurityDepositAuthorization {
        SecurityDepositAuthorization::request(
            BookingId::new(),
            150_000,
            CurrencyCode::EUR,
            hours,
            Utc::now(),
        )
        .unwrap()
    }

    fn authorized() -> SecurityDepositAuthorization {
        let mut auth = pending(MAX_AUTHORIZATION_HOURS);
        auth.confirm(Utc::now()).unwrap();
        auth
    }

    #[test]
    fn test_request_validates_amount_and_expiry() {
        let booking = BookingId::new();
        let now = Utc::now();
        assert!(matches!(
            SecurityDepositAuthorization::request(booking, 0, CurrencyCode::EUR, 24, now),
            Err(DomainError::NonPositiveAmount(0))
        ));
        assert!(matches!(
            SecurityDepositAuthorization::request(booking, 100, CurrencyCode::EUR, 8761, now),
            Err(DomainError::ExpiryOutOfRange(8761))
        ));
        assert!(
            SecurityDepositAuthorization::request(booking, 100, CurrencyCode::EUR, 8760, now)
                .is_ok()
        );
    }

    #[test]
    fn test_confirm_sets_expiry_from_authorized_at() {
        let mut auth = pending(MAX_AUTHORIZATION_HOURS);
        let at = Utc::now() + Duration::hours(3);
        assert_eq!(auth.confirm(at).unwrap(), ConfirmOutcome::Authorized);
        assert_eq!(auth.authorized_at, Some(at));
        assert_eq!(auth.expires_at, at + Duration::hours(8760));

        assert_eq!(
            auth.confirm(at + Duration::hours(1)).unwrap(),
            ConfirmOutcome::AlreadyAuthorized
        );
        assert_eq!(auth.authorized_at, Some(at));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut auth = authorized();
        let first = Utc::now();
        assert_eq!(auth.release(first).unwrap(), ReleaseOutcome::Released);

        let second = first + Duration::minutes(5);
        assert_eq!(auth.release(second).unwrap(), ReleaseOutcome::AlreadyReleased);
        assert_eq!(auth.released_at, Some(first));
    }

    #[test]
    fn test_capture_exceeding_authorization_fails() {
        let mut auth = authorized();
        for requested in [150_001, 200_000, i64::MAX] {
            assert!(matches!(
                auth.capture(requested, "damage", Utc::now()),
                Err(DomainError::CaptureExceedsAuthorization { .. })
            ));
        }
        assert_eq!(auth.status, DepositStatus::Authorized);
    }

    #[test]
    fn test_capture_requires_reason() {
        let mut auth = authorized();
        assert!(matches!(
            auth.capture(100, "  ", Utc::now()),
            Err(DomainError::MissingCaptureReason)
        ));
        auth.capture(50_000, "scratched bumper", Utc::now()).unwrap();
        assert_eq!(auth.status, DepositStatus::Captured);
        assert_eq!(auth.captured_amount, Some(50_000));
    }

    #[test]
    fn test_no_way_back_from_terminal_states() {
        let now = Utc::now();
        let mut released = authorized();
        released.release(now).unwrap();
        let mut captured = authorized();
        captured.capture(10, "fuel", now).unwrap();

        for auth in [&mut released, &mut captured] {
            let before = auth.status;
            assert!(auth.confirm(now).is_err());
            assert!(auth.capture(1, "again", now).is_err());
            assert!(auth.expire(now + Duration::hours(9000)).is_err());
            assert_eq!(auth.status, before);
        }
        assert!(captured.release(now).is_err());
    }

    #[test]
    fn test_release_of_pending_is_conflict() {
        let mut auth = pending(24);
        match auth.release(Utc::now()).unwrap_err() {
            DomainError::InvalidTransition {
                current, requested, ..
            } => {
                assert_eq!(current, "pending");
                assert_eq!(requested, "released");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_expiry_is_lazy_then_persisted() {
        let mut auth = pending(1);
        let later = Utc::now() + Duration::hours(2);
        assert_eq!(auth.status, DepositStatus::Pending);
        assert_eq!(auth.status_at(later), DepositStatus::Expired);

        assert!(auth.expire(Utc::now()).is_err());
        auth.expire(later).unwrap();
        assert_eq!(auth.status, DepositStatus::Expired);
    }

    #[test]
    fn test_current_authorization_precedence() {
        let base = Utc::now();
        let mut old_authorized = pending(24);
        old_authorized.created_at = base;
        old_authorized.status = DepositStatus::Authorized;

        let mut released = pending(24);
        released.created_at = base + Duration::hours(1);
        released.status = DepositStatus::Released;

        let mut newest_pending = pending(24);
        newest_pending.created_at = base + Duration::hours(2);

        let all = vec![
            newest_pending.clone(),
            released.clone(),
            old_authorized.clone(),
        ];
        assert_eq!(current_authorization(&all).unwrap().id, old_authorized.id);

        let without_authorized = vec![newest_pending.clone(), released.clone()];
        assert_eq!(
            current_authorization(&without_authorized).unwrap().id,
            released.id
        );

        let mut older_pending = pending(24);
        older_pending.created_at = base;
        let only_pending = vec![older_pending, newest_pending.clone()];
        assert_eq!(
            current_authorization(&only_pending).unwrap().id,
            newest_pending.id
        );
        assert!(current_authorization(&[]).is_none());
    }
}
