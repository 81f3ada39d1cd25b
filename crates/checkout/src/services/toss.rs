//! Toss Payments confirmation client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use domain::{Money, PaymentMethod};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::gateway::{ConfirmRequest, ConfirmationReceipt, GatewayClient, GatewayError};

const CONFIRM_PATH: &str = "/v1/payments/confirm";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TossConfirmBody<'a> {
    payment_key: &'a str,
    order_id: &'a str,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct TossReceipt {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TossConfirmResponse {
    payment_key: Option<String>,
    order_id: Option<String>,
    status: Option<String>,
    total_amount: Option<i64>,
    method: Option<String>,
    approved_at: Option<String>,
    receipt: Option<TossReceipt>,
}

#[derive(Debug, Deserialize)]
struct TossErrorBody {
    code: String,
    message: String,
}

/// HTTP client for the Toss Payments confirm API.
#[derive(Debug)]
pub struct TossGatewayClient {
    http_client: Client,
    base_url: String,
    secret_key: SecretString,
}

impl TossGatewayClient {
    #[tracing::instrument(skip(secret_key))]
    pub fn new(
        base_url: String,
        secret_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        tracing::info!("Configuring Toss Payments gateway client.");
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    /// Basic auth with the secret key as user name and an empty password.
    fn get_auth_header(&self) -> String {
        let credentials = format!("{}:", self.secret_key.expose_secret());
        format!("Basic {}", BASE64.encode(credentials))
    }

    fn parse_approved_at(value: Option<&str>) -> DateTime<Utc> {
        value
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }

    fn into_receipt(
        request: &ConfirmRequest,
        body: TossConfirmResponse,
    ) -> Result<ConfirmationReceipt, GatewayError> {
        if let Some(status) = body.status.as_deref()
            && matches!(status, "ABORTED" | "CANCELED" | "EXPIRED")
        {
            return Err(GatewayError::Rejected {
                code: status.to_string(),
                message: "Payment was not approved".to_string(),
            });
        }

        Ok(ConfirmationReceipt {
            payment_key: body
                .payment_key
                .unwrap_or_else(|| request.payment_key.clone()),
            gateway_order_id: body
                .order_id
                .unwrap_or_else(|| request.order_token.to_string()),
            method: body
                .method
                .as_deref()
                .map(PaymentMethod::from_gateway_label)
                .unwrap_or_default(),
            total_amount: body
                .total_amount
                .map(Money::new)
                .unwrap_or(request.amount),
            receipt_url: body.receipt.and_then(|r| r.url),
            approved_at: Self::parse_approved_at(body.approved_at.as_deref()),
        })
    }
}

#[async_trait]
impl GatewayClient for TossGatewayClient {
    #[tracing::instrument(skip(self, request), fields(order_token = %request.order_token, amount = request.amount.amount()))]
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmationReceipt, GatewayError> {
        request.validate()?;

        let body = TossConfirmBody {
            payment_key: &request.payment_key,
            order_id: request.order_token.as_str(),
            amount: request.amount.amount(),
        };

        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, CONFIRM_PATH))
            .header("Authorization", self.get_auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Toss confirm request failed: {}", e);
                GatewayError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
            let error = serde_json::from_str::<TossErrorBody>(&text).unwrap_or(TossErrorBody {
                code: status.as_u16().to_string(),
                message: text,
            });
            tracing::warn!(code = %error.code, "Toss declined confirmation: {}", error.message);
            return Err(GatewayError::Rejected {
                code: error.code,
                message: error.message,
            });
        }

        let body = response
            .json::<TossConfirmResponse>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Self::into_receipt(&request, body)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
    };
    use common::OrderId;
    use domain::GatewayToken;
    use serde_json::{Value, json};

    use super::*;

    const SECRET: &str = "test_sk_123";

    async fn confirm_handler(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
        let expected = format!("Basic {}", BASE64.encode(format!("{SECRET}:")));
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "code": "UNAUTHORIZED_KEY", "message": "bad key" })),
            );
        }
        if body["paymentKey"] == "pk_declined" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": "REJECT_CARD_COMPANY", "message": "Card declined" })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "paymentKey": body["paymentKey"],
                "orderId": body["orderId"],
                "status": "DONE",
                "totalAmount": body["amount"],
                "method": "가상계좌",
                "approvedAt": "2024-12-01T14:30:05+09:00",
                "receipt": { "url": "https://receipt.example/1" }
            })),
        )
    }

    async fn spawn_mock() -> SocketAddr {
        let app = Router::new().route(CONFIRM_PATH, post(confirm_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr, secret: &str) -> TossGatewayClient {
        TossGatewayClient::new(
            format!("http://{addr}/"),
            SecretString::from(secret.to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn request(payment_key: &str) -> ConfirmRequest {
        ConfirmRequest {
            payment_key: payment_key.to_string(),
            order_token: GatewayToken::for_order(OrderId::new()),
            amount: Money::new(47_000),
        }
    }

    #[tokio::test]
    async fn test_confirm_success() {
        let addr = spawn_mock().await;
        let request = request("pk_ok");
        let receipt = client(addr, SECRET).confirm(request.clone()).await.unwrap();

        assert_eq!(receipt.payment_key, "pk_ok");
        assert_eq!(receipt.gateway_order_id, request.order_token.as_str());
        assert_eq!(receipt.total_amount, Money::new(47_000));
        assert_eq!(receipt.method, PaymentMethod::VirtualAccount);
        assert_eq!(receipt.receipt_url.as_deref(), Some("https://receipt.example/1"));
        assert_eq!(receipt.approved_at.to_rfc3339(), "2024-12-01T05:30:05+00:00");
    }

    #[tokio::test]
    async fn test_declined_confirmation() {
        let addr = spawn_mock().await;
        let result = client(addr, SECRET).confirm(request("pk_declined")).await;
        assert_eq!(
            result.unwrap_err(),
            GatewayError::Rejected {
                code: "REJECT_CARD_COMPANY".to_string(),
                message: "Card declined".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let addr = spawn_mock().await;
        let result = client(addr, "wrong").confirm(request("pk_ok")).await;
        assert!(matches!(
            result,
            Err(GatewayError::Rejected { ref code, .. }) if code == "UNAUTHORIZED_KEY"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(addr, SECRET).confirm(request("pk_ok")).await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[test]
    fn test_approved_at_falls_back_to_now() {
        let before = Utc::now();
        let parsed = TossGatewayClient::parse_approved_at(Some("not a date"));
        assert!(parsed >= before);
        assert!(TossGatewayClient::parse_approved_at(None) >= before);
    }
}
