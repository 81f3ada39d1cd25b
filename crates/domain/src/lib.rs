//! Domain layer for the checkout platform.
//!
//! This crate holds the entities the checkout saga moves between states:
//! - Order with its PENDING → PAID → COMPLETED / CANCELED state machine
//! - Customer and the point balance it owns
//! - Menu entries (the authoritative price source)
//! - PaymentRequest (the reservation record) and Payment (the settled charge)
//!
//! Everything here is pure: persistence lives in the `store` crate and the
//! orchestration in `checkout`.

pub mod customer;
pub mod error;
pub mod menu;
pub mod order;
pub mod payment;

pub use customer::{Customer, PointBalance, PointError};
pub use error::DomainError;
pub use menu::Menu;
pub use order::{
    Money, NewOrder, Order, OrderError, OrderLine, OrderNumber, OrderStatus, OrderType, Points,
};
pub use payment::{
    GatewayToken, Payment, PaymentMethod, PaymentRequest, PaymentRequestError,
    PaymentRequestStatus, ReservationPayload, Settlement, StatusTransition,
};
