//! Cart invalidation after a successful payment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::CustomerId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart service unavailable: {0}")]
    Unavailable(String),
}

/// Clears a customer's cart once their order is paid.
#[async_trait]
pub trait CartCollaborator: Send + Sync {
    async fn invalidate(&self, customer_id: CustomerId) -> Result<(), CartError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    invalidated: Mutex<Vec<CustomerId>>,
    fail: AtomicBool,
}

/// In-memory cart collaborator that records invalidations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCart {
    state: Arc<InMemoryCartState>,
}

impl InMemoryCart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following invalidation fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the customers whose carts were invalidated, in call order.
    pub fn invalidated(&self) -> Vec<CustomerId> {
        self.state
            .invalidated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CartCollaborator for InMemoryCart {
    async fn invalidate(&self, customer_id: CustomerId) -> Result<(), CartError> {
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(CartError::Unavailable("cart store offline".to_string()));
        }
        self.state
            .invalidated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(customer_id);
        Ok(())
    }
}
