//! Payment gateway port and its in-memory implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{GatewayToken, Money, PaymentMethod};
use thiserror::Error;

/// Errors raised by a gateway confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request was rejected before it was sent.
    #[error("Invalid confirmation request: {0}")]
    InvalidRequest(String),

    /// The gateway declined the confirmation.
    #[error("Gateway rejected confirmation [{code}]: {message}")]
    Rejected { code: String, message: String },

    /// The gateway could not be reached or timed out.
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// The gateway answered with a body we could not read.
    #[error("Unreadable gateway response: {0}")]
    Decode(String),
}

/// A charge to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub payment_key: String,
    pub order_token: GatewayToken,
    pub amount: Money,
}

impl ConfirmRequest {
    /// Rejects requests that can never be confirmed.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.payment_key.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "payment key must not be blank".to_string(),
            ));
        }
        if self.order_token.as_str().trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "order token must not be blank".to_string(),
            ));
        }
        if !self.amount.is_positive() {
            return Err(GatewayError::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount.amount()
            )));
        }
        Ok(())
    }
}

/// What the gateway reports for a confirmed charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationReceipt {
    pub payment_key: String,
    /// Gateway-side order id; recorded as the approval code.
    pub gateway_order_id: String,
    pub method: PaymentMethod,
    pub total_amount: Money,
    pub receipt_url: Option<String>,
    pub approved_at: DateTime<Utc>,
}

/// External payment processor.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Confirms a reserved charge.
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmationReceipt, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    fail_on_confirm: AtomicBool,
    confirm_calls: AtomicUsize,
}

/// Sandbox gateway that approves every valid confirmation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGatewayClient {
    state: Arc<InMemoryGatewayState>,
    delay: Option<Duration>,
}

impl InMemoryGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays each confirmation, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Configures the gateway to decline confirmations.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.state.fail_on_confirm.store(fail, Ordering::SeqCst);
    }

    /// Returns how many confirmations were attempted.
    pub fn confirm_count(&self) -> usize {
        self.state.confirm_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayClient for InMemoryGatewayClient {
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmationReceipt, GatewayError> {
        request.validate()?;
        self.state.confirm_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_on_confirm.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                code: "REJECT_CARD_COMPANY".to_string(),
                message: "Card declined".to_string(),
            });
        }

        Ok(ConfirmationReceipt {
            payment_key: request.payment_key,
            gateway_order_id: request.order_token.to_string(),
            method: PaymentMethod::Card,
            total_amount: request.amount,
            receipt_url: None,
            approved_at: Utc::now(),
        })
    }
}
