//! Payment reservations and settled payments.

mod request;
mod settlement;
mod state;

pub use request::{GatewayToken, PaymentRequest, ReservationPayload, StatusTransition};
pub use settlement::{Payment, PaymentMethod, Settlement};
pub use state::PaymentRequestStatus;

use thiserror::Error;

/// Errors raised by payment request operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentRequestError {
    #[error("Gateway token must not be blank")]
    BlankToken,

    #[error("Reserved amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Payment provider must not be blank")]
    BlankProvider,

    /// Transitions may only target a terminal status.
    #[error("Cannot transition a payment request to non-terminal status {0}")]
    NonTerminalTarget(PaymentRequestStatus),

    /// The stored payload could not be decoded.
    #[error("Corrupt reservation payload: {0}")]
    CorruptPayload(String),

    #[error("Unknown payment request status: {0}")]
    UnknownStatus(String),

    #[error("Unknown payment method: {0}")]
    UnknownMethod(String),
}
