//! Caller authorization.

use async_trait::async_trait;
use common::CustomerId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Caller {caller} may not act for customer {claimed}")]
    Mismatch {
        caller: CustomerId,
        claimed: CustomerId,
    },
}

/// Decides whether an authenticated caller may check out for a customer.
#[async_trait]
pub trait CustomerAuthenticator: Send + Sync {
    async fn authorize(&self, caller: CustomerId, claimed: CustomerId) -> Result<(), AuthError>;
}

/// Allows a caller to act only for itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingCustomerAuthenticator;

#[async_trait]
impl CustomerAuthenticator for MatchingCustomerAuthenticator {
    async fn authorize(&self, caller: CustomerId, claimed: CustomerId) -> Result<(), AuthError> {
        if caller != claimed {
            return Err(AuthError::Mismatch { caller, claimed });
        }
        Ok(())
    }
}
