//! The payment reservation record.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentRequestId};
use serde::{Deserialize, Serialize};

use super::{PaymentRequestError, PaymentRequestStatus};
use crate::order::Money;

/// Gateway-facing order token.
///
/// Derived deterministically from the internal order id so gateway logs can
/// be correlated with orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayToken(String);

impl GatewayToken {
    /// Derives the token for an order: `TOSS_` + first 16 hex digits, uppercased.
    pub fn for_order(order_id: OrderId) -> Self {
        let hex = order_id.as_uuid().simple().to_string();
        Self(format!("TOSS_{}", hex[..16].to_uppercase()))
    }

    /// Wraps a token received from outside, rejecting blank values.
    pub fn parse(value: impl Into<String>) -> Result<Self, PaymentRequestError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(PaymentRequestError::BlankToken);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GatewayToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What was reserved: the token and the amount the gateway must confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPayload {
    pub order_token: GatewayToken,
    pub amount: Money,
}

/// A terminal status change to apply to a pending reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    status: PaymentRequestStatus,
    failure_reason: Option<String>,
    at: DateTime<Utc>,
}

impl StatusTransition {
    /// Creates a transition to a terminal status.
    pub fn new(
        status: PaymentRequestStatus,
        failure_reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Self, PaymentRequestError> {
        if !status.is_terminal() {
            return Err(PaymentRequestError::NonTerminalTarget(status));
        }
        Ok(Self {
            status,
            failure_reason,
            at,
        })
    }

    /// Transition to COMPLETED.
    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            status: PaymentRequestStatus::Completed,
            failure_reason: None,
            at,
        }
    }

    pub fn status(&self) -> PaymentRequestStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// One checkout attempt's reservation against the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: PaymentRequestId,
    pub order_id: OrderId,
    pub provider: String,
    pub token: GatewayToken,
    /// Serialized [`ReservationPayload`]. The validator re-reads the
    /// reserved amount from here, never from the caller.
    pub request_payload: serde_json::Value,
    pub status: PaymentRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl PaymentRequest {
    /// Opens a new PENDING reservation.
    pub fn open(
        order_id: OrderId,
        provider: impl Into<String>,
        token: GatewayToken,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, PaymentRequestError> {
        let provider = provider.into();
        if provider.trim().is_empty() {
            return Err(PaymentRequestError::BlankProvider);
        }
        if token.as_str().trim().is_empty() {
            return Err(PaymentRequestError::BlankToken);
        }
        if !amount.is_positive() {
            return Err(PaymentRequestError::NonPositiveAmount(amount.amount()));
        }

        let payload = ReservationPayload {
            order_token: token.clone(),
            amount,
        };
        let request_payload = serde_json::to_value(&payload)
            .map_err(|e| PaymentRequestError::CorruptPayload(e.to_string()))?;

        Ok(Self {
            id: PaymentRequestId::new(),
            order_id,
            provider,
            token,
            request_payload,
            status: PaymentRequestStatus::Pending,
            requested_at: now,
            responded_at: None,
            failure_reason: None,
        })
    }

    /// Decodes the stored payload.
    pub fn payload(&self) -> Result<ReservationPayload, PaymentRequestError> {
        serde_json::from_value(self.request_payload.clone())
            .map_err(|e| PaymentRequestError::CorruptPayload(e.to_string()))
    }

    /// Returns the amount recorded at reservation time.
    pub fn reserved_amount(&self) -> Result<Money, PaymentRequestError> {
        self.payload().map(|p| p.amount)
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentRequestStatus::Pending
    }

    /// Applies a terminal transition if still pending.
    ///
    /// Returns false and leaves the record untouched if it is already terminal.
    pub fn apply_transition(&mut self, transition: &StatusTransition) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = transition.status;
        self.responded_at = Some(transition.at);
        self.failure_reason = transition.failure_reason.clone();
        true
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn open(amount: i64) -> PaymentRequest {
        let order_id = OrderId::new();
        PaymentRequest::open(
            order_id,
            "TOSS",
            GatewayToken::for_order(order_id),
            Money::new(amount),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_token_derivation() {
        let uuid = Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap();
        let token = GatewayToken::for_order(OrderId::from_uuid(uuid));
        assert_eq!(token.as_str(), "TOSS_3FA85F6457174562");
    }

    #[test]
    fn test_blank_token_rejected() {
        assert_eq!(
            GatewayToken::parse("   ").unwrap_err(),
            PaymentRequestError::BlankToken
        );
    }

    #[test]
    fn test_open_records_payload() {
        let request = open(10_000);
        assert!(request.is_pending());
        assert_eq!(request.reserved_amount().unwrap(), Money::new(10_000));
        assert_eq!(
            request.request_payload["orderToken"],
            serde_json::json!(request.token.as_str())
        );
        assert_eq!(request.request_payload["amount"], 10_000);
    }

    #[test]
    fn test_open_rejects_non_positive_amount() {
        let order_id = OrderId::new();
        let result = PaymentRequest::open(
            order_id,
            "TOSS",
            GatewayToken::for_order(order_id),
            Money::ZERO,
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), PaymentRequestError::NonPositiveAmount(0));
    }

    #[test]
    fn test_transition_applies_once() {
        let mut request = open(10_000);
        let cancel = StatusTransition::new(
            PaymentRequestStatus::Canceled,
            Some("timeout".to_string()),
            Utc::now(),
        )
        .unwrap();

        assert!(request.apply_transition(&cancel));
        assert_eq!(request.status, PaymentRequestStatus::Canceled);
        assert_eq!(request.failure_reason.as_deref(), Some("timeout"));
        assert!(request.responded_at.is_some());

        assert!(!request.apply_transition(&StatusTransition::completed(Utc::now())));
        assert_eq!(request.status, PaymentRequestStatus::Canceled);
    }

    #[test]
    fn test_transition_must_target_terminal_status() {
        let result = StatusTransition::new(PaymentRequestStatus::Pending, None, Utc::now());
        assert_eq!(
            result.unwrap_err(),
            PaymentRequestError::NonTerminalTarget(PaymentRequestStatus::Pending)
        );
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let mut request = open(10_000);
        request.request_payload = serde_json::json!({ "amount": "lots" });
        assert!(matches!(
            request.reserved_amount(),
            Err(PaymentRequestError::CorruptPayload(_))
        ));
    }
}
