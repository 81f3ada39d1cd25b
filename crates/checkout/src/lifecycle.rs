//! Order creation and status changes.

use std::sync::Arc;

use chrono::Utc;
use common::{CustomerId, MenuId, OrderId, PaymentId, StoreId};
use domain::{Money, NewOrder, Order, OrderNumber, OrderType, Points};
use store::Store;

use crate::error::{CheckoutError, Result};
use crate::services::CartCollaborator;

/// One requested line: which menu item and how many.
///
/// The client may send a price; it is only logged when it disagrees with the
/// catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub menu_id: MenuId,
    pub quantity: u32,
    pub claimed_price: Option<i64>,
}

/// Input for [`OrderLifecycle::create_pending`].
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub customer_id: CustomerId,
    pub store_id: StoreId,
    pub lines: Vec<LineRequest>,
    pub order_type: OrderType,
    pub use_points: bool,
    pub points_to_use: Points,
}

/// Owns the order status machine.
#[derive(Clone)]
pub struct OrderLifecycle<S> {
    store: S,
    cart: Arc<dyn CartCollaborator>,
    max_amount: Option<Money>,
}

impl<S: Store> OrderLifecycle<S> {
    pub fn new(store: S, cart: Arc<dyn CartCollaborator>) -> Self {
        Self {
            store,
            cart,
            max_amount: None,
        }
    }

    /// Rejects orders whose payable amount exceeds `max` before they are stored.
    pub fn with_max_amount(mut self, max: Money) -> Self {
        self.max_amount = Some(max);
        self
    }

    /// Prices the lines from the menu catalogue and stores a PENDING order.
    #[tracing::instrument(skip(self, pending), fields(customer_id = %pending.customer_id))]
    pub async fn create_pending(&self, pending: PendingOrder) -> Result<Order> {
        let mut lines = Vec::with_capacity(pending.lines.len());
        for requested in &pending.lines {
            let menu = self.store.get_menu(requested.menu_id).await?;
            if let Some(claimed) = requested.claimed_price
                && claimed != menu.price.amount()
            {
                tracing::warn!(
                    menu_id = %menu.id,
                    claimed,
                    catalogue = menu.price.amount(),
                    "client price differs from catalogue; using catalogue price"
                );
            }
            lines.push(menu.line(requested.quantity));
        }

        let order = Order::place(
            NewOrder {
                customer_id: pending.customer_id,
                store_id: pending.store_id,
                order_type: pending.order_type,
                lines,
                use_points: pending.use_points,
                points_to_use: pending.points_to_use,
            },
            Utc::now(),
        )?;
        if let Some(max) = self.max_amount
            && order.final_payment_amount() > max
        {
            return Err(CheckoutError::LimitExceeded {
                amount: order.final_payment_amount(),
                max,
            });
        }
        self.store.insert_order(&order).await?;

        tracing::info!(
            order_id = %order.id(),
            order_number = %order.order_number(),
            total = order.total_price().amount(),
            final_amount = order.final_payment_amount().amount(),
            "pending order created"
        );
        Ok(order)
    }

    /// Moves a PENDING order to PAID and clears the customer's cart.
    ///
    /// Cart invalidation is best-effort: its failure is logged and ignored.
    #[tracing::instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: OrderId, payment_id: PaymentId) -> Result<Order> {
        let order = self
            .store
            .update_order(order_id, move |order| {
                order.mark_paid(payment_id, Utc::now())?;
                Ok(order.clone())
            })
            .await?;

        if let Err(e) = self.cart.invalidate(order.customer_id()).await {
            tracing::warn!(customer_id = %order.customer_id(), error = %e, "cart invalidation failed");
        }

        tracing::info!("order marked paid");
        Ok(order)
    }

    /// Cancels an order. Cancelling an already canceled order is a no-op.
    ///
    /// Returns true if this call moved the order to CANCELED.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<bool> {
        let changed = self
            .store
            .update_order(order_id, |order| Ok(order.cancel(Utc::now())?))
            .await?;

        if changed {
            tracing::info!("order canceled");
        } else {
            tracing::debug!("order already canceled");
        }
        Ok(changed)
    }

    /// Moves a PAID order to COMPLETED.
    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .update_order(order_id, |order| {
                order.complete(Utc::now())?;
                Ok(order.clone())
            })
            .await?;
        tracing::info!("order completed");
        Ok(order)
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.store.get_order(order_id).await?)
    }

    pub async fn find_by_number(&self, number: &OrderNumber) -> Result<Order> {
        self.store
            .find_order_by_number(number)
            .await?
            .ok_or_else(|| CheckoutError::not_found("order", number))
    }

    /// Lists a customer's orders, newest first.
    pub async fn list_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_for_customer(customer_id).await?)
    }
}
