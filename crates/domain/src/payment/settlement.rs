//! Settled payment records.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, PaymentId, PaymentRequestId};
use serde::{Deserialize, Serialize};

use super::{PaymentRequest, PaymentRequestError};
use crate::order::{Money, Order, Points};

/// How a payment was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Card,
    VirtualAccount,
    Transfer,
    Phone,
    GiftCertificate,
    /// Fully covered by loyalty points; no gateway involved.
    Points,
}

impl PaymentMethod {
    /// Maps the gateway's method label. Unknown labels settle as card.
    pub fn from_gateway_label(label: &str) -> Self {
        match label.trim() {
            "카드" | "CARD" => PaymentMethod::Card,
            "가상계좌" | "VIRTUAL_ACCOUNT" => PaymentMethod::VirtualAccount,
            "계좌이체" | "TRANSFER" => PaymentMethod::Transfer,
            "휴대폰" | "MOBILE_PHONE" => PaymentMethod::Phone,
            "상품권" | "문화상품권" | "도서문화상품권" | "게임문화상품권" | "GIFT_CERTIFICATE" => {
                PaymentMethod::GiftCertificate
            }
            _ => PaymentMethod::Card,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::VirtualAccount => "VIRTUAL_ACCOUNT",
            PaymentMethod::Transfer => "TRANSFER",
            PaymentMethod::Phone => "PHONE",
            PaymentMethod::GiftCertificate => "GIFT_CERTIFICATE",
            PaymentMethod::Points => "POINTS",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = PaymentRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "VIRTUAL_ACCOUNT" => Ok(PaymentMethod::VirtualAccount),
            "TRANSFER" => Ok(PaymentMethod::Transfer),
            "PHONE" => Ok(PaymentMethod::Phone),
            "GIFT_CERTIFICATE" => Ok(PaymentMethod::GiftCertificate),
            "POINTS" => Ok(PaymentMethod::Points),
            other => Err(PaymentRequestError::UnknownMethod(other.to_string())),
        }
    }
}

/// Gateway-issued details of a confirmed charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub pg_transaction_id: String,
    pub approval_code: Option<String>,
    pub method: PaymentMethod,
    pub receipt_url: Option<String>,
    pub approved_at: DateTime<Utc>,
}

/// A settled charge. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// None for points-only settlements.
    pub payment_request_id: Option<PaymentRequestId>,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub points_used: Points,
    pub pg_transaction_id: Option<String>,
    pub approval_code: Option<String>,
    pub method: PaymentMethod,
    pub receipt_url: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: DateTime<Utc>,
}

impl Payment {
    /// Records a gateway-confirmed charge for a reservation.
    pub fn settled(request: &PaymentRequest, order: &Order, settlement: Settlement) -> Self {
        Self {
            id: PaymentId::new(),
            payment_request_id: Some(request.id),
            order_id: order.id(),
            customer_id: order.customer_id(),
            total_amount: order.final_payment_amount(),
            points_used: order.points_to_use(),
            pg_transaction_id: Some(settlement.pg_transaction_id),
            approval_code: settlement.approval_code,
            method: settlement.method,
            receipt_url: settlement.receipt_url,
            requested_at: request.requested_at,
            approved_at: settlement.approved_at,
        }
    }

    /// Records an order fully covered by points.
    pub fn points_only(order: &Order, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            payment_request_id: None,
            order_id: order.id(),
            customer_id: order.customer_id(),
            total_amount: Money::ZERO,
            points_used: order.points_to_use(),
            pg_transaction_id: None,
            approval_code: None,
            method: PaymentMethod::Points,
            receipt_url: None,
            requested_at: now,
            approved_at: now,
        }
    }
}
