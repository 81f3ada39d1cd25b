//! Application configuration loaded from environment variables.

use std::sync::Arc;
use std::time::Duration;

use checkout::services::{
    GatewayClient, GatewayError, InMemoryGatewayClient, TossGatewayClient,
};
use checkout::settings::DEFAULT_MAX_AMOUNT;
use checkout::CheckoutSettings;
use domain::Money;
use secrecy::SecretString;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: Postgres URL; the in-memory store is used when unset
/// - `PAYMENT_TEST_MODE`: shortens the reservation window to 10 seconds
/// - `PAYMENT_TIMEOUT_SECS`: explicit reservation window
/// - `MAX_PAYMENT_AMOUNT`: callback amount ceiling
/// - `TOSS_BASE_URL`, `TOSS_SECRET_KEY`, `TOSS_CLIENT_KEY`: gateway access;
///   the sandbox gateway is used when no secret key is set
/// - `GATEWAY_TIMEOUT_SECS`: HTTP timeout of the gateway call
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<SecretString>,
    pub payment_test_mode: bool,
    pub payment_timeout: Option<Duration>,
    pub max_payment_amount: i64,
    pub toss_base_url: String,
    pub toss_secret_key: Option<SecretString>,
    pub toss_client_key: String,
    pub gateway_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: non_empty("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: non_empty("DATABASE_URL").map(SecretString::from),
            payment_test_mode: non_empty("PAYMENT_TEST_MODE")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false),
            payment_timeout: non_empty("PAYMENT_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
            max_payment_amount: non_empty("MAX_PAYMENT_AMOUNT")
                .and_then(|v| v.parse().ok())
                .filter(|amount: &i64| *amount > 0)
                .unwrap_or(defaults.max_payment_amount),
            toss_base_url: non_empty("TOSS_BASE_URL").unwrap_or(defaults.toss_base_url),
            toss_secret_key: non_empty("TOSS_SECRET_KEY").map(SecretString::from),
            toss_client_key: non_empty("TOSS_CLIENT_KEY").unwrap_or(defaults.toss_client_key),
            gateway_timeout: non_empty("GATEWAY_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.gateway_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// An explicit timeout wins over the test-mode switch.
    pub fn reservation_window(&self) -> Duration {
        self.payment_timeout
            .unwrap_or_else(|| CheckoutSettings::window_for(self.payment_test_mode))
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            provider: "TOSS".to_string(),
            client_key: self.toss_client_key.clone(),
            max_amount: Money::new(self.max_payment_amount),
            reservation_window: self.reservation_window(),
        }
    }

    /// Builds the Toss client, or the sandbox gateway when no secret is set.
    pub fn gateway(&self) -> Result<Arc<dyn GatewayClient>, GatewayError> {
        match &self.toss_secret_key {
            Some(secret) => Ok(Arc::new(TossGatewayClient::new(
                self.toss_base_url.clone(),
                secret.clone(),
                self.gateway_timeout,
            )?)),
            None => {
                tracing::warn!("TOSS_SECRET_KEY not set; using the sandbox gateway");
                Ok(Arc::new(InMemoryGatewayClient::new()))
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            payment_test_mode: false,
            payment_timeout: None,
            max_payment_amount: DEFAULT_MAX_AMOUNT.amount(),
            toss_base_url: "https://api.tosspayments.com".to_string(),
            toss_secret_key: None,
            toss_client_key: "test_client_key".to_string(),
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.max_payment_amount, 100_000_000);
        assert_eq!(config.toss_base_url, "https://api.tosspayments.com");
        assert_eq!(config.reservation_window(), Duration::from_secs(300));
    }

    #[test]
    fn test_reservation_window_selection() {
        let test_mode = config_from(&[("PAYMENT_TEST_MODE", "true")]);
        assert_eq!(test_mode.reservation_window(), Duration::from_secs(10));

        let explicit = config_from(&[("PAYMENT_TEST_MODE", "true"), ("PAYMENT_TIMEOUT_SECS", "42")]);
        assert_eq!(explicit.reservation_window(), Duration::from_secs(42));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/checkout"),
            ("MAX_PAYMENT_AMOUNT", "500000"),
            ("TOSS_CLIENT_KEY", "ck_live"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_ref().unwrap().expose_secret(),
            "postgres://localhost/checkout"
        );

        let settings = config.checkout_settings();
        assert_eq!(settings.max_amount, Money::new(500_000));
        assert_eq!(settings.client_key, "ck_live");
        assert_eq!(settings.provider, "TOSS");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("MAX_PAYMENT_AMOUNT", "-1"),
            ("GATEWAY_TIMEOUT_SECS", ""),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_payment_amount, 100_000_000);
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let config = config_from(&[("TOSS_SECRET_KEY", "test_sk_very_secret")]);
        assert!(!format!("{config:?}").contains("test_sk_very_secret"));
    }
}
