//! Checkout and callback payloads.

use chrono::{DateTime, Utc};
use common::{CustomerId, MenuId, OrderId, PaymentId, PaymentRequestId, StoreId};
use domain::{
    GatewayToken, Money, OrderNumber, OrderStatus, OrderType, PaymentMethod, Points,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CheckoutError;
use crate::lifecycle::LineRequest;

/// Store used when the payload does not name one.
pub const DEFAULT_STORE_ID: Uuid = Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440000);

fn default_store_id() -> StoreId {
    StoreId::from_uuid(DEFAULT_STORE_ID)
}

/// One line of the checkout payload.
///
/// `menuName` and `price` are whatever the storefront displayed; neither is
/// trusted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub menu_id: MenuId,
    #[serde(default)]
    pub menu_name: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    pub quantity: u32,
}

/// The checkout payload posted by the storefront.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer_id: CustomerId,
    #[serde(default = "default_store_id")]
    pub store_id: StoreId,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub use_points: bool,
    #[serde(default)]
    pub points_to_use: i64,
    /// Client-computed totals; recomputed server side and only logged.
    #[serde(default)]
    pub total_price: Option<i64>,
    #[serde(default)]
    pub final_payment_amount: Option<i64>,
    #[serde(default)]
    pub order_menu_list: Vec<CheckoutLine>,
}

impl CheckoutRequest {
    /// Parses and structurally validates a raw JSON payload.
    pub fn parse(raw: &str) -> Result<Self, CheckoutError> {
        let request: CheckoutRequest = serde_json::from_str(raw)
            .map_err(|e| CheckoutError::InvalidPayload(e.to_string()))?;

        if request.order_menu_list.is_empty() {
            return Err(CheckoutError::InvalidPayload(
                "orderMenuList must contain at least one item".to_string(),
            ));
        }
        if let Some(line) = request.order_menu_list.iter().find(|l| l.quantity == 0) {
            return Err(CheckoutError::InvalidPayload(format!(
                "quantity for menu {} must be greater than 0",
                line.menu_id
            )));
        }
        if request.points_to_use < 0 {
            return Err(CheckoutError::InvalidPayload(format!(
                "pointsToUse must not be negative, got {}",
                request.points_to_use
            )));
        }
        request.order_type()?;

        Ok(request)
    }

    /// Resolves the order type; absent means delivery.
    pub fn order_type(&self) -> Result<OrderType, CheckoutError> {
        match self.order_type.as_deref() {
            None => Ok(OrderType::default()),
            Some(raw) => raw
                .parse()
                .map_err(|e: domain::OrderError| CheckoutError::InvalidPayload(e.to_string())),
        }
    }

    /// Points to apply; zero unless `usePoints` is set.
    pub fn points(&self) -> Points {
        if self.use_points {
            Points::new(self.points_to_use)
        } else {
            Points::ZERO
        }
    }

    pub fn line_requests(&self) -> Vec<LineRequest> {
        self.order_menu_list
            .iter()
            .map(|line| LineRequest {
                menu_id: line.menu_id,
                quantity: line.quantity,
                claimed_price: line.price,
            })
            .collect()
    }
}

/// Redirect payload returned by a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    /// Gateway-facing token; absent when points covered the whole order.
    pub order_id: Option<GatewayToken>,
    pub internal_order_id: OrderId,
    pub order_number: OrderNumber,
    pub amount: Money,
    pub original_amount: Money,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub client_key: String,
    pub use_points: bool,
    pub points_used: Points,
    pub status: OrderStatus,
}

impl CheckoutResult {
    pub fn requires_payment(&self) -> bool {
        self.order_id.is_some()
    }
}

/// Query parameters of the gateway's success redirect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessCallback {
    pub payment_key: Option<String>,
    /// The gateway token, which the gateway calls `orderId`.
    #[serde(rename = "orderId")]
    pub order_token: Option<String>,
    pub amount: Option<i64>,
}

/// Query parameters of the gateway's fail or cancel redirect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCallback {
    #[serde(rename = "orderId")]
    pub order_token: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl FailureCallback {
    pub(crate) fn reason(&self) -> String {
        format!(
            "{}: {}",
            self.code.as_deref().unwrap_or("UNKNOWN"),
            self.message.as_deref().unwrap_or("payment was not completed")
        )
    }
}

/// Result of a committed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub payment_id: PaymentId,
    pub payment_request_id: PaymentRequestId,
    pub order_id: GatewayToken,
    pub internal_order_id: OrderId,
    pub order_number: OrderNumber,
    pub amount: Money,
    pub points_used: Points,
    pub method: PaymentMethod,
    pub approved_at: DateTime<Utc>,
}

/// Result of a failure or cancel callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureOutcome {
    pub order_id: String,
    pub internal_order_id: OrderId,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub rollback_completed: bool,
    pub refunded_points: Points,
    pub point_refund_message: Option<String>,
}

/// What the sweeper found when a reservation's window elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The reservation was still PENDING and has been rolled back.
    Expired {
        order_id: OrderId,
        refunded_points: Points,
    },
    /// A callback settled the reservation first.
    AlreadyTerminal,
    /// The reservation no longer exists.
    Missing,
}
