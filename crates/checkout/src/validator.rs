//! Inbound gateway callback validation.

use domain::{Money, PaymentRequest};
use store::Store;

use crate::error::{CallbackRejection, Result};
use crate::requests::PaymentRequestStore;

/// Checks a success callback against its stored reservation.
///
/// Checks run in a fixed order and stop at the first failure: required
/// fields, amount ceiling, reservation lookup, PENDING status, and finally
/// the exact amount match. Nothing is mutated.
#[derive(Clone)]
pub struct CallbackValidator<S> {
    requests: PaymentRequestStore<S>,
    max_amount: Money,
}

impl<S: Store> CallbackValidator<S> {
    pub fn new(requests: PaymentRequestStore<S>, max_amount: Money) -> Self {
        Self {
            requests,
            max_amount,
        }
    }

    /// Returns the validated PENDING reservation.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        token: Option<&str>,
        amount: Option<i64>,
    ) -> Result<PaymentRequest> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or(CallbackRejection::MissingFields("orderId"))?;
        let claimed = Money::new(amount.ok_or(CallbackRejection::MissingFields("amount"))?);

        if claimed > self.max_amount {
            return Err(CallbackRejection::LimitExceeded {
                amount: claimed,
                max: self.max_amount,
            }
            .into());
        }

        let request = self
            .requests
            .find_by_token(token)
            .await?
            .ok_or_else(|| CallbackRejection::ReservationNotFound(token.to_string()))?;

        if !request.is_pending() {
            return Err(CallbackRejection::AlreadyProcessed {
                status: request.status,
            }
            .into());
        }

        let payload = request
            .payload()
            .map_err(|e| CallbackRejection::CorruptPayload(e.to_string()))?;
        if payload.order_token != request.token {
            return Err(CallbackRejection::CorruptPayload(format!(
                "payload token {} does not match reservation token {}",
                payload.order_token, request.token
            ))
            .into());
        }
        if payload.amount != claimed {
            return Err(CallbackRejection::AmountMismatch {
                reserved: payload.amount,
                claimed,
            }
            .into());
        }

        Ok(request)
    }
}
