//! Checkout error types.

use domain::{DomainError, Money, OrderError, PaymentRequestError, PaymentRequestStatus, PointError};
use store::StoreError;
use thiserror::Error;

use crate::services::GatewayError;

/// Broad classes of checkout failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unauthorized input, rejected before any mutation.
    Validation,
    /// A referenced order, customer, menu or reservation is missing.
    NotFound,
    /// The request is well formed but breaks a business rule.
    BusinessRule,
    /// The payment gateway call failed.
    Upstream,
    /// Stored state contradicts itself; no automatic recovery is attempted.
    Inconsistency,
    /// The datastore or another piece of infrastructure failed.
    Infrastructure,
}

/// Why an inbound gateway callback was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackRejection {
    #[error("Missing required callback field: {0}")]
    MissingFields(&'static str),

    #[error("Amount {amount} exceeds the maximum of {max}")]
    LimitExceeded { amount: Money, max: Money },

    #[error("No payment request for token {0}")]
    ReservationNotFound(String),

    /// Anti-replay gate: the reservation already reached a terminal status.
    #[error("Payment request already processed (status {status})")]
    AlreadyProcessed { status: PaymentRequestStatus },

    /// Another callback for the same reservation is talking to the gateway.
    #[error("Payment request is already being confirmed")]
    ConfirmationInProgress,

    /// Tamper detection: the claimed amount differs from the reserved one.
    #[error("Amount mismatch: reserved {reserved}, claimed {claimed}")]
    AmountMismatch { reserved: Money, claimed: Money },

    #[error("Stored reservation payload is unreadable: {0}")]
    CorruptPayload(String),
}

impl CallbackRejection {
    pub fn reason_code(&self) -> &'static str {
        match self {
            CallbackRejection::MissingFields(_) => "MISSING_FIELDS",
            CallbackRejection::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            CallbackRejection::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            CallbackRejection::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            CallbackRejection::ConfirmationInProgress => "CONFIRMATION_IN_PROGRESS",
            CallbackRejection::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            CallbackRejection::CorruptPayload(_) => "CORRUPT_PAYLOAD",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CallbackRejection::MissingFields(_) => ErrorKind::Validation,
            CallbackRejection::ReservationNotFound(_) => ErrorKind::NotFound,
            CallbackRejection::LimitExceeded { .. }
            | CallbackRejection::AlreadyProcessed { .. }
            | CallbackRejection::ConfirmationInProgress
            | CallbackRejection::AmountMismatch { .. } => ErrorKind::BusinessRule,
            CallbackRejection::CorruptPayload(_) => ErrorKind::Inconsistency,
        }
    }
}

/// Errors returned by the checkout saga operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The checkout payload could not be parsed or is structurally invalid.
    #[error("Invalid checkout payload: {0}")]
    InvalidPayload(String),

    /// The authenticated caller is not the customer named in the payload.
    #[error("Caller is not authorized to act for customer {claimed}")]
    Forbidden { claimed: String },

    /// The payable amount is above what a callback may ever claim.
    #[error("Order amount {amount} exceeds the maximum of {max}")]
    LimitExceeded { amount: Money, max: Money },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A domain rule rejected the operation.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    #[error("Callback rejected: {0}")]
    Callback(#[from] CallbackRejection),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A compensation or commit step found its references missing.
    #[error("Inconsistent state: {0}")]
    Inconsistency(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CheckoutError::NotFound { entity, id },
            StoreError::Rejected(domain) => CheckoutError::Rejected(domain),
            other => CheckoutError::Store(other),
        }
    }
}

impl From<PointError> for CheckoutError {
    fn from(err: PointError) -> Self {
        CheckoutError::Rejected(err.into())
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        CheckoutError::Rejected(err.into())
    }
}

impl From<PaymentRequestError> for CheckoutError {
    fn from(err: PaymentRequestError) -> Self {
        CheckoutError::Rejected(err.into())
    }
}

impl CheckoutError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CheckoutError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the broad failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::InvalidPayload(_) | CheckoutError::Forbidden { .. } => {
                ErrorKind::Validation
            }
            CheckoutError::NotFound { .. } => ErrorKind::NotFound,
            CheckoutError::LimitExceeded { .. } => ErrorKind::BusinessRule,
            CheckoutError::Rejected(err) => match err {
                DomainError::Points(PointError::InsufficientBalance { .. })
                | DomainError::Order(OrderError::InvalidStateTransition { .. }) => {
                    ErrorKind::BusinessRule
                }
                DomainError::PaymentRequest(PaymentRequestError::CorruptPayload(_)) => {
                    ErrorKind::Inconsistency
                }
                _ => ErrorKind::Validation,
            },
            CheckoutError::Callback(rejection) => rejection.kind(),
            CheckoutError::Gateway(_) => ErrorKind::Upstream,
            CheckoutError::Inconsistency(_) => ErrorKind::Inconsistency,
            CheckoutError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Machine-readable reason code for callers.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CheckoutError::InvalidPayload(_) => "INVALID_PAYLOAD",
            CheckoutError::Forbidden { .. } => "CUSTOMER_MISMATCH",
            CheckoutError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            CheckoutError::NotFound { entity, .. } => match *entity {
                "order" => "ORDER_NOT_FOUND",
                "customer" => "CUSTOMER_NOT_FOUND",
                "menu" => "MENU_NOT_FOUND",
                "payment request" => "PAYMENT_REQUEST_NOT_FOUND",
                _ => "NOT_FOUND",
            },
            CheckoutError::Rejected(err) => match err {
                DomainError::Points(PointError::InsufficientBalance { .. }) => {
                    "INSUFFICIENT_POINTS"
                }
                DomainError::Points(_) => "INVALID_POINTS",
                DomainError::Order(OrderError::InvalidStateTransition { .. }) => {
                    "INVALID_ORDER_STATE"
                }
                DomainError::Order(_) => "INVALID_ORDER",
                DomainError::PaymentRequest(_) => "INVALID_PAYMENT_REQUEST",
            },
            CheckoutError::Callback(rejection) => rejection.reason_code(),
            CheckoutError::Gateway(_) => "GATEWAY_ERROR",
            CheckoutError::Inconsistency(_) => "INCONSISTENT_STATE",
            CheckoutError::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns true for the anti-replay rejection.
    pub fn is_already_processed(&self) -> bool {
        matches!(
            self,
            CheckoutError::Callback(CallbackRejection::AlreadyProcessed { .. })
        )
    }

    /// Returns true if another callback holds the reservation.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            CheckoutError::Callback(CallbackRejection::ConfirmationInProgress)
        )
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
