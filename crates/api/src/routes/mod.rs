//! HTTP handlers, one module per resource.

pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
