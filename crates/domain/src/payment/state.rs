//! Payment request status machine.

use serde::{Deserialize, Serialize};

use super::PaymentRequestError;

/// Status of a payment reservation.
///
/// PENDING is the only non-terminal status; a reservation leaves it exactly
/// once and never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRequestStatus {
    /// Waiting for a gateway callback or the timeout.
    #[default]
    Pending,

    /// Gateway confirmed the charge.
    Completed,

    /// Customer canceled or the reservation timed out.
    Canceled,

    /// Gateway reported a failure.
    Failed,
}

impl PaymentRequestStatus {
    /// Returns true if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentRequestStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRequestStatus::Pending => "PENDING",
            PaymentRequestStatus::Completed => "COMPLETED",
            PaymentRequestStatus::Canceled => "CANCELED",
            PaymentRequestStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentRequestStatus {
    type Err = PaymentRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentRequestStatus::Pending),
            "COMPLETED" => Ok(PaymentRequestStatus::Completed),
            "CANCELED" => Ok(PaymentRequestStatus::Canceled),
            "FAILED" => Ok(PaymentRequestStatus::Failed),
            other => Err(PaymentRequestError::UnknownStatus(other.to_string())),
        }
    }
}
