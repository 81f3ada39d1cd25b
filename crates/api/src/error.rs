//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, ErrorKind};
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The caller did not identify itself.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga error, mapped by its kind.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, "INTERNAL_ERROR")
            }
        };

        let body = ErrorBody {
            error: message,
            code,
        };
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String, &'static str) {
    let code = err.reason_code();
    let status = match (&err, err.kind()) {
        (CheckoutError::Forbidden { .. }, _) => StatusCode::FORBIDDEN,
        (err, _) if err.is_already_processed() || err.is_in_progress() => StatusCode::CONFLICT,
        (_, _) if code == "INVALID_ORDER_STATE" => StatusCode::CONFLICT,
        (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        (_, ErrorKind::BusinessRule) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorKind::Upstream) => StatusCode::BAD_GATEWAY,
        (_, ErrorKind::Inconsistency) | (_, ErrorKind::Infrastructure) => {
            tracing::error!(error = %err, code, "checkout failed on the server side");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string(), code)
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

#[cfg(test)]
mod tests {
    use checkout::CallbackRejection;
    use domain::{Money, PaymentRequestStatus, PointError};

    use super::*;

    fn status_of(err: CheckoutError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_kind_to_status_mapping() {
        assert_eq!(
            status_of(CheckoutError::InvalidPayload("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CheckoutError::Forbidden {
                claimed: "c".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(
                PointError::InsufficientBalance {
                    available: 1,
                    requested: 2
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(
                CallbackRejection::AmountMismatch {
                    reserved: Money::new(10),
                    claimed: Money::new(5)
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(
                CallbackRejection::AlreadyProcessed {
                    status: PaymentRequestStatus::Completed
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CallbackRejection::ConfirmationInProgress.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::LimitExceeded {
                amount: Money::new(200),
                max: Money::new(100)
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CheckoutError::Inconsistency("gone".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized() {
        let response = ApiError::Unauthorized("missing x-customer-id".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
