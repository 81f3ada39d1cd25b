//! Customer entity and its loyalty point balance.

use common::CustomerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::Points;

/// Errors raised by point balance operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointError {
    /// Amount must be strictly positive.
    #[error("Invalid point amount: {0} (must be greater than 0)")]
    InvalidAmount(i64),

    /// Not enough points to cover the reservation.
    #[error("Insufficient points: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    /// A balance can never be created negative.
    #[error("Point balance cannot be negative: {0}")]
    NegativeBalance(i64),
}

/// A non-negative spendable point balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct PointBalance(i64);

impl PointBalance {
    /// Creates a balance, rejecting negative values.
    pub fn new(value: i64) -> Result<Self, PointError> {
        if value < 0 {
            return Err(PointError::NegativeBalance(value));
        }
        Ok(Self(value))
    }

    /// Returns the current balance.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Debits `amount` points. Fails without mutation if the balance is short.
    pub fn reserve(&mut self, amount: Points) -> Result<Points, PointError> {
        let requested = amount.value();
        if requested <= 0 {
            return Err(PointError::InvalidAmount(requested));
        }
        if self.0 < requested {
            return Err(PointError::InsufficientBalance {
                available: self.0,
                requested,
            });
        }
        self.0 -= requested;
        Ok(Points::new(self.0))
    }

    /// Credits `amount` points back.
    ///
    /// Refunds are not matched against earlier reservations.
    pub fn refund(&mut self, amount: Points) -> Result<Points, PointError> {
        let value = amount.value();
        if value <= 0 {
            return Err(PointError::InvalidAmount(value));
        }
        self.0 = self.0.saturating_add(value);
        Ok(Points::new(self.0))
    }
}

impl TryFrom<i64> for PointBalance {
    type Error = PointError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PointBalance> for i64 {
    fn from(balance: PointBalance) -> Self {
        balance.0
    }
}

/// A customer as seen by checkout: identity, display name and points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub points: PointBalance,
}

impl Customer {
    /// Creates a customer.
    pub fn new(id: CustomerId, name: impl Into<String>, points: PointBalance) -> Self {
        Self {
            id,
            name: name.into(),
            points,
        }
    }

    /// Debits points from this customer's balance.
    pub fn reserve_points(&mut self, amount: Points) -> Result<Points, PointError> {
        self.points.reserve(amount)
    }

    /// Credits points back to this customer's balance.
    pub fn refund_points(&mut self, amount: Points) -> Result<Points, PointError> {
        self.points.refund(amount)
    }
}
