//! Loyalty point reservations and refunds.

use common::CustomerId;
use domain::Points;
use store::Store;

use crate::error::Result;

/// Owns every mutation of a customer's point balance.
#[derive(Clone)]
pub struct PointLedger<S> {
    store: S,
}

impl<S: Store> PointLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Debits points, failing without mutation if the balance is short.
    ///
    /// Returns the new balance.
    #[tracing::instrument(skip(self, amount), fields(amount = amount.value()))]
    pub async fn reserve(&self, customer_id: CustomerId, amount: Points) -> Result<Points> {
        let balance = self
            .store
            .update_customer(customer_id, move |customer| {
                Ok(customer.reserve_points(amount)?)
            })
            .await?;

        tracing::info!(%customer_id, balance = balance.value(), "points reserved");
        Ok(balance)
    }

    /// Credits points back.
    ///
    /// Refunds are not matched against a prior reservation; `context` is
    /// logged with every refund so they can be reconciled later.
    #[tracing::instrument(skip(self, amount), fields(amount = amount.value()))]
    pub async fn refund(
        &self,
        customer_id: CustomerId,
        amount: Points,
        context: &str,
    ) -> Result<Points> {
        let balance = self
            .store
            .update_customer(customer_id, move |customer| {
                Ok(customer.refund_points(amount)?)
            })
            .await?;

        metrics::counter!("points_refunded_total").increment(amount.value().unsigned_abs());
        tracing::info!(
            %customer_id,
            refunded = amount.value(),
            balance = balance.value(),
            context,
            "points refunded"
        );
        Ok(balance)
    }

    /// Returns the current balance.
    pub async fn balance(&self, customer_id: CustomerId) -> Result<Points> {
        let customer = self.store.get_customer(customer_id).await?;
        Ok(Points::new(customer.points.value()))
    }
}
