//! Identifier types shared by every crate of the checkout platform.

pub mod types;

pub use types::{CustomerId, MenuId, OrderId, PaymentId, PaymentRequestId, StoreId};
