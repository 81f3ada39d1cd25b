//! Checkout payment saga.
//!
//! [`CheckoutOrchestrator`] is the entry point. It drives one checkout
//! through these components:
//! - [`PointLedger`]: point debits and refunds
//! - [`OrderLifecycle`]: the order status machine
//! - [`PaymentRequestStore`]: reservations and their guarded transition
//! - [`CallbackValidator`]: checks on inbound gateway callbacks
//! - [`RollbackCompensator`]: order cancel plus point refund
//! - [`TimeoutSweeper`]: per-reservation expiry timers
//!
//! External systems (payment gateway, cart, caller authorization) sit behind
//! the traits in [`services`].

pub mod compensator;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod orchestrator;
pub mod request;
pub mod requests;
pub mod services;
pub mod settings;
pub mod sweeper;
pub mod validator;

pub use compensator::{RollbackCompensator, RollbackOutcome, RollbackResult, RollbackTrigger};
pub use error::{CallbackRejection, CheckoutError, ErrorKind, Result};
pub use ledger::PointLedger;
pub use lifecycle::{LineRequest, OrderLifecycle, PendingOrder};
pub use orchestrator::{CheckoutOrchestrator, TIMEOUT_REASON};
pub use request::{
    CheckoutLine, CheckoutRequest, CheckoutResult, DEFAULT_STORE_ID, FailureCallback,
    FailureOutcome, PaymentConfirmation, SuccessCallback, SweepOutcome,
};
pub use requests::PaymentRequestStore;
pub use services::{
    Collaborators, GatewayClient, GatewayError, InMemoryCart, InMemoryGatewayClient,
    TossGatewayClient,
};
pub use settings::CheckoutSettings;
pub use sweeper::TimeoutSweeper;
pub use validator::CallbackValidator;
