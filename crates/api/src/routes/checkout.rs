//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use checkout::CheckoutResult;
use common::CustomerId;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the authenticated caller's customer id.
pub const CUSTOMER_HEADER: &str = "x-customer-id";

fn caller(headers: &HeaderMap) -> Result<CustomerId, ApiError> {
    let raw = headers
        .get(CUSTOMER_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {CUSTOMER_HEADER} header")))?;
    raw.to_str()
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("malformed {CUSTOMER_HEADER} header")))
}

/// POST /checkout: body is the raw order JSON.
#[tracing::instrument(skip(state, headers, body))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<CheckoutResult>, ApiError> {
    let caller = caller(&headers)?;
    let result = state.checkout.process_checkout(caller, &body).await?;
    Ok(Json(result))
}
