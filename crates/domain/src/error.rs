//! Domain error types.

use thiserror::Error;

use crate::customer::PointError;
use crate::order::OrderError;
use crate::payment::PaymentRequestError;

/// Errors raised when a domain command is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// An order command was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A point balance command was rejected.
    #[error("Point error: {0}")]
    Points(#[from] PointError),

    /// A payment request command was rejected.
    #[error("Payment request error: {0}")]
    PaymentRequest(#[from] PaymentRequestError),
}
