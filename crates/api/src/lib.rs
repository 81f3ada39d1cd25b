//! HTTP surface of the checkout payment saga.
//!
//! Exposes checkout, the gateway redirect callbacks and order reads, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{CheckoutOrchestrator, Collaborators, DEFAULT_STORE_ID};
use checkout::services::{InMemoryCart, MatchingCustomerAuthenticator};
use common::{CustomerId, MenuId, StoreId};
use domain::{Customer, DomainError, Menu, Money, PointBalance};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CustomerRepository, MenuRepository, Store, StoreError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;

/// Customer seeded into the in-memory store.
pub const DEMO_CUSTOMER_ID: Uuid = Uuid::from_u128(0x11111111_1111_1111_1111_111111111111);

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub checkout: Arc<CheckoutOrchestrator<S>>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/checkout", post(routes::checkout::create::<S>))
        .route("/payments/success", get(routes::payments::success::<S>))
        .route("/payments/fail", get(routes::payments::failure::<S>))
        .route("/payments/cancel", get(routes::payments::failure::<S>))
        .route("/payment-requests/{token}", get(routes::payments::by_token::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/complete", post(routes::orders::complete::<S>))
        .route("/customers/{id}/orders", get(routes::orders::for_customer::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the orchestrator for `store` from the configuration.
///
/// Must be called from within a tokio runtime.
pub fn create_state<S: Store>(store: S, config: &Config) -> Result<Arc<AppState<S>>, ApiError> {
    let gateway = config
        .gateway()
        .map_err(|e| ApiError::Internal(format!("gateway client: {e}")))?;
    let collaborators = Collaborators::new(
        gateway,
        Arc::new(InMemoryCart::new()),
        Arc::new(MatchingCustomerAuthenticator),
    );
    let checkout = CheckoutOrchestrator::start(store, collaborators, config.checkout_settings());
    Ok(Arc::new(AppState { checkout }))
}

/// Seeds a customer with points and a small menu into the default store.
pub async fn seed_demo_data<S: Store>(store: &S) -> Result<(), StoreError> {
    let customer = Customer::new(
        CustomerId::from_uuid(DEMO_CUSTOMER_ID),
        "Demo Customer",
        PointBalance::new(10_000).map_err(DomainError::from)?,
    );
    store.insert_customer(&customer).await?;

    let store_id = StoreId::from_uuid(DEFAULT_STORE_ID);
    let menus = [
        (0x22222222_2222_2222_2222_000000000001_u128, "Bulgogi Set", 25_000),
        (0x22222222_2222_2222_2222_000000000002_u128, "Bibimbap", 10_000),
        (0x22222222_2222_2222_2222_000000000003_u128, "Kimchi Jjigae", 9_000),
    ];
    for (id, name, price) in menus {
        let menu = Menu::new(
            MenuId::from_uuid(Uuid::from_u128(id)),
            store_id,
            name,
            Money::new(price),
        );
        store.insert_menu(&menu).await?;
    }

    tracing::info!(customer_id = %customer.id, menus = menus.len(), "demo data seeded");
    Ok(())
}
