//! Order entity and related types.

mod aggregate;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use state::OrderStatus;
pub use value_objects::{Money, OrderLine, OrderNumber, OrderType, Points};

use common::MenuId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_status} status")]
    InvalidStateTransition {
        current_status: OrderStatus,
        action: &'static str,
    },

    /// Order has no line items.
    #[error("Order has no line items")]
    NoLines,

    /// A line item has an invalid quantity.
    #[error("Invalid quantity {quantity} for menu {menu_id} (must be greater than 0)")]
    InvalidQuantity { menu_id: MenuId, quantity: u32 },

    /// A line item has an invalid unit price.
    #[error("Invalid price {price} for menu {menu_id} (must not be negative)")]
    InvalidPrice { menu_id: MenuId, price: i64 },

    /// Requested point usage is negative.
    #[error("Invalid points to use: {points} (must not be negative)")]
    InvalidPoints { points: i64 },

    /// Unknown order type code or display name.
    #[error("Unknown order type: {0}")]
    UnknownOrderType(String),

    /// The order total does not fit in a money amount.
    #[error("Order total overflows")]
    AmountOverflow,
}
