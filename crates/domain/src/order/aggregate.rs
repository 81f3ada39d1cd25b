//! Order entity implementation.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, PaymentId, StoreId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderLine, OrderNumber, OrderStatus, OrderType, Points};

/// Input for placing a new order.
///
/// Line prices must already be resolved against the menu catalogue.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub store_id: StoreId,
    pub order_type: OrderType,
    pub lines: Vec<OrderLine>,
    pub use_points: bool,
    pub points_to_use: Points,
}

/// Order entity.
///
/// Represents an order from checkout (PENDING) through settlement (PAID)
/// to fulfilment (COMPLETED) or cancellation (CANCELED). The amount fields
/// are computed once at placement and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: OrderId,

    /// Human-readable order number.
    order_number: OrderNumber,

    /// Customer who placed the order.
    customer_id: CustomerId,

    /// Store the order was placed with.
    store_id: StoreId,

    order_type: OrderType,

    /// Priced line items in the order they were submitted.
    lines: Vec<OrderLine>,

    /// Sum of line extensions.
    total_price: Money,

    use_points: bool,

    /// Points applied to this order; zero unless `use_points` is set.
    points_to_use: Points,

    /// Amount the gateway has to charge.
    final_payment_amount: Money,

    /// Current status.
    status: OrderStatus,

    /// Settled payment, set when the order becomes PAID.
    payment_id: Option<PaymentId>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the order number.
    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    /// Returns the customer ID.
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Returns the store ID.
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// Returns the order type.
    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Returns the line items.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the total price before points.
    pub fn total_price(&self) -> Money {
        self.total_price
    }

    /// Returns true if the customer asked to spend points.
    pub fn use_points(&self) -> bool {
        self.use_points
    }

    /// Returns the points applied to this order.
    pub fn points_to_use(&self) -> Points {
        self.points_to_use
    }

    /// Returns true if points were actually applied.
    pub fn has_point_usage(&self) -> bool {
        self.use_points && self.points_to_use.is_positive()
    }

    /// Returns the amount left for the gateway to charge.
    pub fn final_payment_amount(&self) -> Money {
        self.final_payment_amount
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the settled payment ID, if any.
    pub fn payment_id(&self) -> Option<PaymentId> {
        self.payment_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// Command methods
impl Order {
    /// Places a new PENDING order, computing all amount fields up front.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.lines.is_empty() {
            return Err(OrderError::NoLines);
        }

        for line in &new.lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    menu_id: line.menu_id,
                    quantity: line.quantity,
                });
            }
            if line.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    menu_id: line.menu_id,
                    price: line.unit_price.amount(),
                });
            }
        }

        let points_to_use = if new.use_points {
            new.points_to_use
        } else {
            Points::ZERO
        };
        if points_to_use.value() < 0 {
            return Err(OrderError::InvalidPoints {
                points: points_to_use.value(),
            });
        }

        let total_price = new
            .lines
            .iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.line_total()?))
            .ok_or(OrderError::AmountOverflow)?;
        let final_payment_amount = total_price.less_points(points_to_use);

        Ok(Self {
            id: OrderId::new(),
            order_number: OrderNumber::generate(now),
            customer_id: new.customer_id,
            store_id: new.store_id,
            order_type: new.order_type,
            lines: new.lines,
            total_price,
            use_points: new.use_points,
            points_to_use,
            final_payment_amount,
            status: OrderStatus::Pending,
            payment_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Marks the order as paid by the given payment.
    pub fn mark_paid(&mut self, payment_id: PaymentId, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_pay() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "pay",
            });
        }

        self.status = OrderStatus::Paid;
        self.payment_id = Some(payment_id);
        self.updated_at = now;
        Ok(())
    }

    /// Cancels the order.
    ///
    /// Returns `Ok(true)` if the order moved to CANCELED and `Ok(false)` if
    /// it was already canceled. Paid and completed orders cannot be canceled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        if self.status == OrderStatus::Canceled {
            return Ok(false);
        }
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "cancel",
            });
        }

        self.status = OrderStatus::Canceled;
        self.updated_at = now;
        Ok(true)
    }

    /// Marks a paid order as fulfilled.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_complete() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "complete",
            });
        }

        self.status = OrderStatus::Completed;
        self.updated_at = now;
        Ok(())
    }
}
