//! Order read and completion endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, PaymentId, StoreId};
use domain::{Order, OrderStatus, OrderType};
use serde::Serialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineResponse {
    pub menu_id: String,
    pub menu_name: String,
    pub unit_price: i64,
    pub quantity: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub store_id: StoreId,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub lines: Vec<OrderLineResponse>,
    pub total_price: i64,
    pub points_used: i64,
    pub final_payment_amount: i64,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            order_number: order.order_number().to_string(),
            customer_id: order.customer_id(),
            store_id: order.store_id(),
            order_type: order.order_type(),
            status: order.status(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    menu_id: line.menu_id.to_string(),
                    menu_name: line.menu_name.clone(),
                    unit_price: line.unit_price.amount(),
                    quantity: line.quantity,
                })
                .collect(),
            total_price: order.total_price().amount(),
            points_used: if order.has_point_usage() {
                order.points_to_use().value()
            } else {
                0
            },
            final_payment_amount: order.final_payment_amount().amount(),
            payment_id: order.payment_id(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what}: {raw}")))
}

/// GET /orders/{id}
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.checkout.get_order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/complete
#[tracing::instrument(skip(state))]
pub async fn complete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.checkout.complete_order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /customers/{id}/orders
pub async fn for_customer<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer_id: CustomerId = parse_id(&id, "customer id")?;
    let orders = state.checkout.orders_for_customer(customer_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}
