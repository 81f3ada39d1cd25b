//! Compensating transactions for abandoned checkouts.

use chrono::Utc;
use common::{OrderId, PaymentRequestId};
use domain::{Order, PaymentRequestStatus, Points, StatusTransition};
use serde::Serialize;
use store::Store;

use crate::error::{CheckoutError, Result};
use crate::ledger::PointLedger;
use crate::lifecycle::OrderLifecycle;
use crate::requests::PaymentRequestStore;

/// What started a compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTrigger {
    /// A later checkout step failed after the order was created.
    Checkout,
    /// The gateway refused or failed the confirmation.
    GatewayFailure,
    /// The storefront reported a failed or canceled payment.
    CallbackFailure,
    /// The reservation window elapsed without a callback.
    Timeout,
    /// An operator or internal flow canceled the order directly.
    Manual,
}

impl RollbackTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackTrigger::Checkout => "checkout",
            RollbackTrigger::GatewayFailure => "gateway_failure",
            RollbackTrigger::CallbackFailure => "callback_failure",
            RollbackTrigger::Timeout => "timeout",
            RollbackTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackOutcome {
    /// This call won the transition and unwound the checkout.
    Compensated,
    /// Someone else already settled the reservation.
    NothingToDo,
}

/// Result of a compensation, for caller-facing messaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub order_id: OrderId,
    pub payment_request_id: Option<PaymentRequestId>,
    pub outcome: RollbackOutcome,
    pub order_canceled: bool,
    pub refunded_points: Points,
    /// Sub-steps that failed and were logged for reconciliation.
    pub warnings: Vec<String>,
}

impl RollbackResult {
    fn nothing_to_do(order_id: OrderId, payment_request_id: Option<PaymentRequestId>) -> Self {
        Self {
            order_id,
            payment_request_id,
            outcome: RollbackOutcome::NothingToDo,
            order_canceled: false,
            refunded_points: Points::ZERO,
            warnings: Vec::new(),
        }
    }

    pub fn is_compensated(&self) -> bool {
        self.outcome == RollbackOutcome::Compensated
    }
}

/// Cancels the order and refunds points, whatever triggered the rollback.
#[derive(Clone)]
pub struct RollbackCompensator<S> {
    store: S,
    requests: PaymentRequestStore<S>,
    lifecycle: OrderLifecycle<S>,
    ledger: PointLedger<S>,
}

impl<S: Store> RollbackCompensator<S> {
    pub fn new(
        store: S,
        requests: PaymentRequestStore<S>,
        lifecycle: OrderLifecycle<S>,
        ledger: PointLedger<S>,
    ) -> Self {
        Self {
            store,
            requests,
            lifecycle,
            ledger,
        }
    }

    /// Loads the order and checks its customer still exists.
    async fn resolve(&self, order_id: OrderId) -> Result<Order> {
        let order = match self.store.get_order(order_id).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => {
                tracing::error!(%order_id, "compensation target order is missing");
                return Err(CheckoutError::Inconsistency(format!(
                    "order {order_id} referenced by compensation does not exist"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        match self.store.get_customer(order.customer_id()).await {
            Ok(_) => Ok(order),
            Err(e) if e.is_not_found() => {
                tracing::error!(
                    %order_id,
                    customer_id = %order.customer_id(),
                    "compensation target customer is missing"
                );
                Err(CheckoutError::Inconsistency(format!(
                    "customer {} of order {order_id} does not exist",
                    order.customer_id()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unwinds a checkout through its reservation.
    ///
    /// Only the caller that wins the PENDING → `terminal_status` transition
    /// cancels the order and refunds points; every other caller gets
    /// [`RollbackOutcome::NothingToDo`].
    #[tracing::instrument(skip(self, reason, trigger), fields(trigger = trigger.as_str()))]
    pub async fn compensate(
        &self,
        payment_request_id: PaymentRequestId,
        terminal_status: PaymentRequestStatus,
        reason: Option<String>,
        trigger: RollbackTrigger,
    ) -> Result<RollbackResult> {
        let request = self.requests.get(payment_request_id).await?;
        let order = self.resolve(request.order_id).await?;

        let transition = StatusTransition::new(terminal_status, reason, Utc::now())?;
        if !self.requests.transition(payment_request_id, transition).await? {
            tracing::info!(order_id = %order.id(), "reservation already terminal; nothing to compensate");
            return Ok(RollbackResult::nothing_to_do(
                order.id(),
                Some(payment_request_id),
            ));
        }

        let mut result = self.unwind(&order, trigger, true).await;
        result.payment_request_id = Some(payment_request_id);

        metrics::counter!("compensations_total", "trigger" => trigger.as_str()).increment(1);
        tracing::warn!(
            order_id = %order.id(),
            refunded = result.refunded_points.value(),
            warnings = result.warnings.len(),
            "checkout compensated"
        );
        Ok(result)
    }

    /// Cancels an order and refunds its points without a reservation.
    ///
    /// Points are refunded only if this call actually moved the order to
    /// CANCELED, so repeating it never refunds twice.
    #[tracing::instrument(skip(self, trigger), fields(trigger = trigger.as_str()))]
    pub async fn compensate_by_order_id(
        &self,
        order_id: OrderId,
        trigger: RollbackTrigger,
    ) -> Result<RollbackResult> {
        let order = self.resolve(order_id).await?;

        let canceled = self.lifecycle.cancel(order_id).await?;
        if !canceled {
            return Ok(RollbackResult::nothing_to_do(order_id, None));
        }

        let mut result = self.unwind(&order, trigger, false).await;
        result.order_canceled = true;

        metrics::counter!("compensations_total", "trigger" => trigger.as_str()).increment(1);
        tracing::warn!(
            %order_id,
            refunded = result.refunded_points.value(),
            "order compensated"
        );
        Ok(result)
    }

    /// Cancels (optionally) and refunds. Sub-step failures are logged and
    /// collected, never propagated.
    async fn unwind(&self, order: &Order, trigger: RollbackTrigger, cancel: bool) -> RollbackResult {
        let mut result = RollbackResult {
            order_id: order.id(),
            payment_request_id: None,
            outcome: RollbackOutcome::Compensated,
            order_canceled: false,
            refunded_points: Points::ZERO,
            warnings: Vec::new(),
        };

        if cancel {
            match self.lifecycle.cancel(order.id()).await {
                Ok(changed) => result.order_canceled = changed,
                Err(e) => {
                    tracing::error!(order_id = %order.id(), error = %e, "order cancel failed during compensation");
                    result.warnings.push(format!("order cancel failed: {e}"));
                }
            }
        }

        if order.has_point_usage() {
            let points = order.points_to_use();
            let context = format!("rollback:{} order:{}", trigger.as_str(), order.id());
            match self
                .ledger
                .refund(order.customer_id(), points, &context)
                .await
            {
                Ok(_) => result.refunded_points = points,
                Err(e) => {
                    tracing::error!(
                        order_id = %order.id(),
                        customer_id = %order.customer_id(),
                        points = points.value(),
                        error = %e,
                        "point refund failed during compensation"
                    );
                    result.warnings.push(format!("point refund failed: {e}"));
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use common::{CustomerId, MenuId, StoreId};
    use domain::{Customer, GatewayToken, Menu, Money, OrderStatus, OrderType, PointBalance};
    use store::{CustomerRepository, InMemoryStore, MenuRepository, OrderRepository};

    use super::*;
    use crate::lifecycle::{LineRequest, PendingOrder};
    use crate::services::InMemoryCart;
    use crate::sweeper::TimeoutSweeper;

    struct Fixture {
        store: InMemoryStore,
        compensator: RollbackCompensator<InMemoryStore>,
        requests: PaymentRequestStore<InMemoryStore>,
        lifecycle: OrderLifecycle<InMemoryStore>,
        ledger: PointLedger<InMemoryStore>,
        customer_id: CustomerId,
        menu: Menu,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let customer = Customer::new(CustomerId::new(), "Han", PointBalance::new(10_000).unwrap());
        store.insert_customer(&customer).await.unwrap();
        let menu = Menu::new(MenuId::new(), StoreId::new(), "Bulgogi", Money::new(25_000));
        store.insert_menu(&menu).await.unwrap();

        let (sweeper, _) = TimeoutSweeper::new(Duration::from_secs(60));
        let requests = PaymentRequestStore::new(store.clone(), sweeper);
        let lifecycle = OrderLifecycle::new(store.clone(), Arc::new(InMemoryCart::new()));
        let ledger = PointLedger::new(store.clone());
        let compensator = RollbackCompensator::new(
            store.clone(),
            requests.clone(),
            lifecycle.clone(),
            ledger.clone(),
        );

        Fixture {
            store,
            compensator,
            requests,
            lifecycle,
            ledger,
            customer_id: customer.id,
            menu,
        }
    }

    /// Creates an order using 3,000 points and its reservation.
    async fn checkout(f: &Fixture) -> (Order, PaymentRequestId) {
        let order = f
            .lifecycle
            .create_pending(PendingOrder {
                customer_id: f.customer_id,
                store_id: f.menu.store_id,
                lines: vec![LineRequest {
                    menu_id: f.menu.id,
                    quantity: 2,
                    claimed_price: None,
                }],
                order_type: OrderType::Delivery,
                use_points: true,
                points_to_use: Points::new(3_000),
            })
            .await
            .unwrap();
        f.ledger
            .reserve(f.customer_id, order.points_to_use())
            .await
            .unwrap();
        let request = f
            .requests
            .reserve(
                order.id(),
                "TOSS",
                GatewayToken::for_order(order.id()),
                order.final_payment_amount(),
            )
            .await
            .unwrap();
        (order, request.id)
    }

    #[tokio::test]
    async fn test_compensate_cancels_and_refunds() {
        let f = fixture().await;
        let (order, request_id) = checkout(&f).await;
        assert_eq!(f.ledger.balance(f.customer_id).await.unwrap(), Points::new(7_000));

        let result = f
            .compensator
            .compensate(
                request_id,
                PaymentRequestStatus::Failed,
                Some("declined".into()),
                RollbackTrigger::GatewayFailure,
            )
            .await
            .unwrap();

        assert!(result.is_compensated());
        assert!(result.order_canceled);
        assert_eq!(result.refunded_points, Points::new(3_000));
        assert!(result.warnings.is_empty());
        assert_eq!(
            f.lifecycle.get(order.id()).await.unwrap().status(),
            OrderStatus::Canceled
        );
        assert_eq!(f.ledger.balance(f.customer_id).await.unwrap(), Points::new(10_000));
        let request = f.requests.get(request_id).await.unwrap();
        assert_eq!(request.status, PaymentRequestStatus::Failed);
    }

    #[tokio::test]
    async fn test_second_compensation_is_noop() {
        let f = fixture().await;
        let (_, request_id) = checkout(&f).await;

        for _ in 0..2 {
            f.compensator
                .compensate(
                    request_id,
                    PaymentRequestStatus::Canceled,
                    None,
                    RollbackTrigger::Timeout,
                )
                .await
                .unwrap();
        }
        let third = f
            .compensator
            .compensate(
                request_id,
                PaymentRequestStatus::Canceled,
                None,
                RollbackTrigger::CallbackFailure,
            )
            .await
            .unwrap();

        assert_eq!(third.outcome, RollbackOutcome::NothingToDo);
        assert_eq!(f.ledger.balance(f.customer_id).await.unwrap(), Points::new(10_000));
    }

    #[tokio::test]
    async fn test_compensate_by_order_id_refunds_once() {
        let f = fixture().await;
        let (order, _) = checkout(&f).await;

        let first = f
            .compensator
            .compensate_by_order_id(order.id(), RollbackTrigger::Manual)
            .await
            .unwrap();
        let second = f
            .compensator
            .compensate_by_order_id(order.id(), RollbackTrigger::Manual)
            .await
            .unwrap();

        assert_eq!(first.refunded_points, Points::new(3_000));
        assert_eq!(second.outcome, RollbackOutcome::NothingToDo);
        assert_eq!(f.ledger.balance(f.customer_id).await.unwrap(), Points::new(10_000));
    }

    #[tokio::test]
    async fn test_missing_customer_is_inconsistency() {
        let f = fixture().await;
        let menu = f.menu.clone();
        let orphan = f
            .lifecycle
            .create_pending(PendingOrder {
                customer_id: CustomerId::new(),
                store_id: menu.store_id,
                lines: vec![LineRequest {
                    menu_id: menu.id,
                    quantity: 1,
                    claimed_price: None,
                }],
                order_type: OrderType::Pickup,
                use_points: false,
                points_to_use: Points::ZERO,
            })
            .await
            .unwrap();

        let err = f
            .compensator
            .compensate_by_order_id(orphan.id(), RollbackTrigger::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Inconsistency(_)));
        assert_eq!(
            f.store.get_order(orphan.id()).await.unwrap().status(),
            OrderStatus::Pending
        );
    }
}
