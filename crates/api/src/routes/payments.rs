//! Gateway redirect callbacks and reservation lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use checkout::{FailureCallback, FailureOutcome, PaymentConfirmation, SuccessCallback};
use common::{OrderId, PaymentRequestId};
use domain::{PaymentRequest, PaymentRequestStatus};
use serde::Serialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequestResponse {
    pub id: PaymentRequestId,
    pub internal_order_id: OrderId,
    pub order_id: String,
    pub provider: String,
    pub status: PaymentRequestStatus,
    pub amount: Option<i64>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl From<PaymentRequest> for PaymentRequestResponse {
    fn from(request: PaymentRequest) -> Self {
        Self {
            amount: request.reserved_amount().ok().map(|amount| amount.amount()),
            id: request.id,
            internal_order_id: request.order_id,
            order_id: request.token.to_string(),
            provider: request.provider,
            status: request.status,
            requested_at: request.requested_at,
            responded_at: request.responded_at,
            failure_reason: request.failure_reason,
        }
    }
}

/// GET /payments/success?paymentKey=..&orderId=..&amount=..
#[tracing::instrument(skip(state, callback))]
pub async fn success<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(callback): Query<SuccessCallback>,
) -> Result<Json<PaymentConfirmation>, ApiError> {
    let confirmation = state.checkout.handle_callback_success(callback).await?;
    Ok(Json(confirmation))
}

/// GET /payments/fail and /payments/cancel
#[tracing::instrument(skip(state, callback))]
pub async fn failure<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(callback): Query<FailureCallback>,
) -> Result<Json<FailureOutcome>, ApiError> {
    let outcome = state
        .checkout
        .handle_callback_failure_or_cancel(callback)
        .await?;
    Ok(Json(outcome))
}

/// GET /payment-requests/{token}
pub async fn by_token<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(token): Path<String>,
) -> Result<Json<PaymentRequestResponse>, ApiError> {
    let request = state.checkout.find_payment_request(&token).await?;
    Ok(Json(request.into()))
}
