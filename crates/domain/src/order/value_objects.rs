//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::MenuId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderError;

/// Money amount in whole won (the currency has no minor unit).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero won.
    pub const ZERO: Money = Money(0);

    /// Creates a money amount.
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns the amount in won.
    pub fn amount(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Subtracts a point discount, never going below zero.
    pub fn less_points(&self, points: Points) -> Money {
        Money((self.0 - points.value()).max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} KRW", self.0)
    }
}

/// Loyalty points. One point is worth one won at checkout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Points(i64);

impl Points {
    /// No points.
    pub const ZERO: Points = Points(0);

    /// Creates a point amount.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw point count.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}P", self.0)
    }
}

/// How the customer receives the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    #[default]
    Delivery,
    Pickup,
    DineIn,
}

impl OrderType {
    /// Returns the canonical order type code.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Delivery => "DELIVERY",
            OrderType::Pickup => "PICKUP",
            OrderType::DineIn => "DINE_IN",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accepts both canonical codes and the storefront's display names.
impl std::str::FromStr for OrderType {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "DELIVERY" | "배달" => Ok(OrderType::Delivery),
            "PICKUP" | "픽업" => Ok(OrderType::Pickup),
            "DINE_IN" | "매장 식사" => Ok(OrderType::DineIn),
            other => Err(OrderError::UnknownOrderType(other.to_string())),
        }
    }
}

/// A priced line item of an order.
///
/// The unit price and name always come from the menu catalogue, never from
/// the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_id: MenuId,
    pub menu_name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a new line item.
    pub fn new(
        menu_id: MenuId,
        menu_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            menu_id,
            menu_name: menu_name.into(),
            unit_price,
            quantity,
        }
    }

    /// Returns the line extension (unit price * quantity), or `None` if it
    /// does not fit in an `i64`.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Human-readable order number, e.g. `ORD-20241201-3FA9C`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a date-stamped order number with a random suffix.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..5].to_uppercase();
        Self(format!("ORD-{}-{}", now.format("%Y%m%d"), suffix))
    }

    /// Wraps an existing order number.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
