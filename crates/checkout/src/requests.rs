//! Payment reservation records.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, PaymentRequestId};
use domain::{GatewayToken, Money, PaymentRequest, StatusTransition};
use store::Store;

use crate::error::Result;
use crate::sweeper::TimeoutSweeper;

/// Stores one reservation per checkout attempt and guards its status.
#[derive(Clone)]
pub struct PaymentRequestStore<S> {
    store: S,
    sweeper: Arc<TimeoutSweeper>,
}

impl<S: Store> PaymentRequestStore<S> {
    pub fn new(store: S, sweeper: Arc<TimeoutSweeper>) -> Self {
        Self { store, sweeper }
    }

    /// Records a PENDING reservation and arms its expiry timer.
    ///
    /// The `{token, amount}` payload written here is the only amount the
    /// callback validator will trust.
    #[tracing::instrument(skip(self, token, amount), fields(token = %token, amount = amount.amount()))]
    pub async fn reserve(
        &self,
        order_id: OrderId,
        provider: &str,
        token: GatewayToken,
        amount: Money,
    ) -> Result<PaymentRequest> {
        let request = PaymentRequest::open(order_id, provider, token, amount, Utc::now())?;
        self.store.insert_payment_request(&request).await?;
        self.sweeper.arm(request.id);

        tracing::info!(payment_request_id = %request.id, "payment request reserved");
        Ok(request)
    }

    /// Looks up a reservation by gateway token. Blank tokens match nothing.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<PaymentRequest>> {
        let Ok(token) = GatewayToken::parse(token) else {
            return Ok(None);
        };
        Ok(self.store.find_payment_request_by_token(&token).await?)
    }

    pub async fn get(&self, id: PaymentRequestId) -> Result<PaymentRequest> {
        Ok(self.store.get_payment_request(id).await?)
    }

    /// Applies a terminal transition if the reservation is still PENDING.
    ///
    /// Exactly one caller per reservation gets `true`; everyone after that
    /// gets `false` and must not apply any side effect.
    #[tracing::instrument(skip(self, transition), fields(status = %transition.status()))]
    pub async fn transition(
        &self,
        id: PaymentRequestId,
        transition: StatusTransition,
    ) -> Result<bool> {
        let won = self.store.transition_payment_request(id, transition).await?;
        if won {
            tracing::info!("payment request transitioned");
        } else {
            tracing::info!("payment request already terminal; transition skipped");
        }
        Ok(won)
    }
}
