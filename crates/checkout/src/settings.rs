//! Saga settings.

use std::time::Duration;

use domain::Money;

/// Reservation window in production.
pub const RESERVATION_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Reservation window in test mode.
pub const TEST_RESERVATION_WINDOW: Duration = Duration::from_secs(10);

/// Largest amount a callback may claim.
pub const DEFAULT_MAX_AMOUNT: Money = Money::new(100_000_000);

/// Settings the checkout saga needs from the surrounding configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Provider name recorded on every payment request.
    pub provider: String,
    /// Client-facing gateway key echoed to the storefront.
    pub client_key: String,
    pub max_amount: Money,
    /// How long a reservation may stay PENDING before it is expired.
    pub reservation_window: Duration,
}

impl CheckoutSettings {
    /// Picks the reservation window for the given mode.
    pub fn window_for(test_mode: bool) -> Duration {
        if test_mode {
            TEST_RESERVATION_WINDOW
        } else {
            RESERVATION_WINDOW
        }
    }

    pub fn with_reservation_window(mut self, window: Duration) -> Self {
        self.reservation_window = window;
        self
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            provider: "TOSS".to_string(),
            client_key: "test_client_key".to_string(),
            max_amount: DEFAULT_MAX_AMOUNT,
            reservation_window: RESERVATION_WINDOW,
        }
    }
}
