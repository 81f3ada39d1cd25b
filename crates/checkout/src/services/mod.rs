//! External collaborators the saga calls out to.
//!
//! Each collaborator is a trait with an in-memory implementation for tests
//! and local runs. The payment gateway additionally has an HTTP client for
//! the Toss Payments API.

pub mod auth;
pub mod cart;
pub mod gateway;
pub mod toss;

use std::sync::Arc;

pub use auth::{AuthError, CustomerAuthenticator, MatchingCustomerAuthenticator};
pub use cart::{CartCollaborator, CartError, InMemoryCart};
pub use gateway::{
    ConfirmRequest, ConfirmationReceipt, GatewayClient, GatewayError, InMemoryGatewayClient,
};
pub use toss::TossGatewayClient;

/// The collaborator set a checkout orchestrator is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn GatewayClient>,
    pub cart: Arc<dyn CartCollaborator>,
    pub authenticator: Arc<dyn CustomerAuthenticator>,
}

impl Collaborators {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        cart: Arc<dyn CartCollaborator>,
        authenticator: Arc<dyn CustomerAuthenticator>,
    ) -> Self {
        Self {
            gateway,
            cart,
            authenticator,
        }
    }

    /// Wires the in-memory gateway and cart with the matching-id authenticator.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryGatewayClient::new()),
            Arc::new(InMemoryCart::new()),
            Arc::new(MatchingCustomerAuthenticator),
        )
    }
}
