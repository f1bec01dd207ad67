//! Domain models for the rental payment core.

mod id;

pub mod api_key;
pub mod booking;
pub mod deposit;
pub mod fees;
pub mod gateway;
pub mod method;
pub mod money;
pub mod payment;
pub mod reconcile;
pub mod webhook;

pub use api_key::{ApiKey, ApiKeyId};
pub use booking::{Booking, BookingId};
pub use deposit::{
    AuthorizationId, ConfirmOutcome, DepositStatus, MAX_AUTHORIZATION_HOURS, ReleaseOutcome,
    SecurityDepositAuthorization, current_authorization,
};
pub use fees::{Calculation, calculate, needs_rate};
pub use gateway::{FinalState, GatewayEvent, GatewayWebhookPayload};
pub use method::{
    Caller, CardNetwork, MethodKind, MethodType, MethodUpdate, PaymentMethod, list_enabled,
};
pub use money::Money;
pub use payment::{LinkStatus, OpenedLink, Payment, PaymentId, PaymentIntent};
pub use reconcile::{ApplyOutcome, IgnoreReason, Plan, plan_admin_settlement, plan_gateway_event};
pub use webhook::{WebhookEvent, WebhookEventId, WebhookStatus};
