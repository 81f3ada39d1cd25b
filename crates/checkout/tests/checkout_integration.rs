//! End-to-end saga tests against the in-memory store and gateway.

use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CallbackRejection, CheckoutError, CheckoutOrchestrator, CheckoutResult, CheckoutSettings,
    Collaborators, DEFAULT_STORE_ID, ErrorKind, FailureCallback, InMemoryCart,
    InMemoryGatewayClient, SuccessCallback, SweepOutcome, TIMEOUT_REASON,
};
use checkout::services::MatchingCustomerAuthenticator;
use chrono::Utc;
use common::{CustomerId, MenuId, OrderId, StoreId};
use domain::{
    Customer, GatewayToken, Menu, Money, OrderStatus, PaymentRequest, PaymentRequestStatus,
    PointBalance, Points,
};
use serde_json::json;
use store::{
    CustomerRepository, InMemoryStore, MenuRepository, OrderRepository, PaymentRepository,
    PaymentRequestRepository,
};

const LONG_WINDOW: Duration = Duration::from_secs(60);

struct Harness {
    orchestrator: Arc<CheckoutOrchestrator<InMemoryStore>>,
    gateway: InMemoryGatewayClient,
    cart: InMemoryCart,
    customer_id: CustomerId,
    /// 25,000 KRW
    bulgogi: MenuId,
    /// 10,000 KRW
    bibimbap: MenuId,
}

impl Harness {
    async fn new(balance: i64) -> Self {
        Self::build(balance, LONG_WINDOW, InMemoryGatewayClient::new()).await
    }

    async fn build(balance: i64, window: Duration, gateway: InMemoryGatewayClient) -> Self {
        let store = InMemoryStore::new();
        let customer_id = CustomerId::new();
        store
            .insert_customer(&Customer::new(
                customer_id,
                "Kim Minji",
                PointBalance::new(balance).unwrap(),
            ))
            .await
            .unwrap();

        let store_id = StoreId::from_uuid(DEFAULT_STORE_ID);
        let bulgogi = MenuId::new();
        let bibimbap = MenuId::new();
        store
            .insert_menu(&Menu::new(bulgogi, store_id, "Bulgogi", Money::new(25_000)))
            .await
            .unwrap();
        store
            .insert_menu(&Menu::new(bibimbap, store_id, "Bibimbap", Money::new(10_000)))
            .await
            .unwrap();

        let cart = InMemoryCart::new();
        let collaborators = Collaborators::new(
            Arc::new(gateway.clone()),
            Arc::new(cart.clone()),
            Arc::new(MatchingCustomerAuthenticator),
        );
        let settings = CheckoutSettings::default().with_reservation_window(window);

        Self {
            orchestrator: CheckoutOrchestrator::start(store, collaborators, settings),
            gateway,
            cart,
            customer_id,
            bulgogi,
            bibimbap,
        }
    }

    fn store(&self) -> &InMemoryStore {
        self.orchestrator.store()
    }

    fn payload(&self, menu: MenuId, quantity: u32, points: Option<i64>) -> String {
        json!({
            "customerId": self.customer_id,
            "orderType": "DELIVERY",
            "usePoints": points.is_some(),
            "pointsToUse": points.unwrap_or(0),
            "orderMenuList": [{ "menuId": menu, "quantity": quantity }],
        })
        .to_string()
    }

    async fn checkout(
        &self,
        menu: MenuId,
        quantity: u32,
        points: Option<i64>,
    ) -> Result<CheckoutResult, CheckoutError> {
        self.orchestrator
            .process_checkout(self.customer_id, &self.payload(menu, quantity, points))
            .await
    }

    async fn balance(&self) -> i64 {
        self.orchestrator
            .point_balance(self.customer_id)
            .await
            .unwrap()
            .value()
    }

    fn success(result: &CheckoutResult, amount: i64) -> SuccessCallback {
        SuccessCallback {
            payment_key: Some("pk_test_123".to_string()),
            order_token: result.order_id.as_ref().map(|t| t.to_string()),
            amount: Some(amount),
        }
    }

    async fn request_status(&self, result: &CheckoutResult) -> PaymentRequestStatus {
        let token = result.order_id.as_ref().unwrap().to_string();
        self.orchestrator
            .find_payment_request(&token)
            .await
            .unwrap()
            .status
    }

    async fn order_status(&self, result: &CheckoutResult) -> OrderStatus {
        self.orchestrator
            .get_order(result.internal_order_id)
            .await
            .unwrap()
            .status()
    }
}

#[tokio::test]
async fn scenario_a_points_reserved_at_checkout() {
    let h = Harness::new(10_000).await;

    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();

    assert_eq!(result.status, OrderStatus::Pending);
    assert_eq!(result.original_amount, Money::new(50_000));
    assert_eq!(result.amount, Money::new(47_000));
    assert_eq!(result.points_used, Points::new(3_000));
    assert!(result.use_points);
    assert_eq!(result.customer_name, "Kim Minji");
    assert_eq!(result.client_key, "test_client_key");
    assert_eq!(h.balance().await, 7_000);

    let token = result.order_id.as_ref().unwrap();
    assert!(token.as_str().starts_with("TOSS_"));
    let request = h.orchestrator.find_payment_request(token.as_str()).await.unwrap();
    assert_eq!(request.reserved_amount().unwrap(), Money::new(47_000));
    assert!(h.orchestrator.sweeper().is_armed(request.id));
}

#[tokio::test]
async fn scenario_b_insufficient_points_cancels_order() {
    let h = Harness::new(1_000).await;

    let err = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(err.reason_code(), "INSUFFICIENT_POINTS");
    assert_eq!(h.balance().await, 1_000);

    let orders = h.orchestrator.orders_for_customer(h.customer_id).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status(), OrderStatus::Canceled);
    assert_eq!(h.store().payment_request_count().await, 0);
}

#[tokio::test]
async fn scenario_c_amount_mismatch_leaves_reservation_pending() {
    let h = Harness::new(0).await;
    let result = h.checkout(h.bibimbap, 1, None).await.unwrap();
    assert_eq!(result.amount, Money::new(10_000));

    let err = h
        .orchestrator
        .handle_callback_success(Harness::success(&result, 5_000))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Callback(CallbackRejection::AmountMismatch { .. })
    ));
    assert_eq!(h.request_status(&result).await, PaymentRequestStatus::Pending);
    assert_eq!(h.order_status(&result).await, OrderStatus::Pending);
    assert_eq!(h.store().payment_count().await, 0);
    assert_eq!(h.gateway.confirm_count(), 0);
}

#[tokio::test]
async fn scenario_d_sweeper_expires_unanswered_reservation() {
    let h = Harness::build(10_000, Duration::from_millis(100), InMemoryGatewayClient::new()).await;
    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();
    assert_eq!(h.balance().await, 7_000);

    let token = result.order_id.as_ref().unwrap().to_string();
    let mut expired = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let request = h.orchestrator.find_payment_request(&token).await.unwrap();
        if !request.is_pending() {
            expired = Some(request);
            break;
        }
    }
    // The refund lands just after the status flip.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = expired.expect("reservation should expire");
    assert_eq!(request.status, PaymentRequestStatus::Canceled);
    assert_eq!(request.failure_reason.as_deref(), Some(TIMEOUT_REASON));
    assert_eq!(h.order_status(&result).await, OrderStatus::Canceled);
    assert_eq!(h.balance().await, 10_000);
    assert_eq!(h.orchestrator.sweeper().armed_count(), 0);
}

#[tokio::test]
async fn scenario_e_callback_wins_then_sweeper_is_noop() {
    let h = Harness::new(10_000).await;
    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();

    let confirmation = h
        .orchestrator
        .handle_callback_success(Harness::success(&result, 47_000))
        .await
        .unwrap();
    assert_eq!(confirmation.internal_order_id, result.internal_order_id);
    assert_eq!(confirmation.amount, Money::new(47_000));
    assert_eq!(confirmation.points_used, Points::new(3_000));

    let outcome = h
        .orchestrator
        .sweep_expired(confirmation.payment_request_id)
        .await
        .unwrap();

    assert_eq!(outcome, SweepOutcome::AlreadyTerminal);
    assert_eq!(h.order_status(&result).await, OrderStatus::Paid);
    assert_eq!(h.request_status(&result).await, PaymentRequestStatus::Completed);
    assert_eq!(h.balance().await, 7_000);
    assert!(!h.orchestrator.sweeper().is_armed(confirmation.payment_request_id));
}

#[tokio::test]
async fn sweeper_winning_the_race_blocks_late_confirmation() {
    let gateway = InMemoryGatewayClient::new().with_delay(Duration::from_millis(200));
    let h = Harness::build(10_000, LONG_WINDOW, gateway).await;
    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();
    let request = h
        .orchestrator
        .find_payment_request(result.order_id.as_ref().unwrap().as_str())
        .await
        .unwrap();

    let orchestrator = h.orchestrator.clone();
    let (callback, sweep) = tokio::join!(
        h.orchestrator
            .handle_callback_success(Harness::success(&result, 47_000)),
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            orchestrator.sweep_expired(request.id).await
        }
    );

    assert!(callback.unwrap_err().is_already_processed());
    assert!(matches!(sweep.unwrap(), SweepOutcome::Expired { .. }));
    assert_eq!(h.gateway.confirm_count(), 1);
    assert_eq!(h.store().payment_count().await, 0);
    assert_eq!(h.order_status(&result).await, OrderStatus::Canceled);
    assert_eq!(h.balance().await, 10_000);
}

#[tokio::test]
async fn amount_invariant_uses_catalogue_prices() {
    let h = Harness::new(100_000).await;
    let payload = json!({
        "customerId": h.customer_id,
        "usePoints": true,
        "pointsToUse": 5_000,
        "totalPrice": 2,
        "finalPaymentAmount": 1,
        "orderMenuList": [
            { "menuId": h.bulgogi, "menuName": "Bulgogi", "price": 1, "quantity": 1 },
            { "menuId": h.bibimbap, "menuName": "Bibimbap", "price": 1, "quantity": 3 },
        ],
    })
    .to_string();

    let result = h
        .orchestrator
        .process_checkout(h.customer_id, &payload)
        .await
        .unwrap();

    assert_eq!(result.original_amount, Money::new(55_000));
    assert_eq!(result.amount, Money::new(50_000));
    let order = h.orchestrator.get_order(result.internal_order_id).await.unwrap();
    assert_eq!(order.lines().len(), 2);
    assert_eq!(order.lines()[1].unit_price, Money::new(10_000));
}

#[tokio::test]
async fn points_covering_total_settle_without_gateway() {
    let h = Harness::new(30_000).await;

    let result = h.checkout(h.bulgogi, 1, Some(25_000)).await.unwrap();

    assert!(!result.requires_payment());
    assert_eq!(result.amount, Money::ZERO);
    assert_eq!(result.status, OrderStatus::Paid);
    assert_eq!(h.balance().await, 5_000);
    assert_eq!(h.store().payment_request_count().await, 0);
    assert_eq!(h.store().payment_count().await, 1);
}

#[tokio::test]
async fn payment_commit_records_payment_and_clears_cart() {
    let h = Harness::new(0).await;
    let result = h.checkout(h.bibimbap, 2, None).await.unwrap();

    let confirmation = h
        .orchestrator
        .handle_callback_success(Harness::success(&result, 20_000))
        .await
        .unwrap();

    let payment = h
        .store()
        .find_payment_by_request(confirmation.payment_request_id)
        .await
        .unwrap()
        .expect("payment recorded");
    assert_eq!(payment.total_amount, Money::new(20_000));
    assert_eq!(payment.pg_transaction_id.as_deref(), Some("pk_test_123"));

    let order = h.store().get_order(result.internal_order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.payment_id(), Some(payment.id));
    assert_eq!(h.cart.invalidated(), vec![h.customer_id]);

    let completed = h
        .orchestrator
        .complete_order(result.internal_order_id)
        .await
        .unwrap();
    assert_eq!(completed.status(), OrderStatus::Completed);
}

#[tokio::test]
async fn cart_failure_does_not_fail_commit() {
    let h = Harness::new(0).await;
    h.cart.set_fail(true);
    let result = h.checkout(h.bibimbap, 1, None).await.unwrap();

    h.orchestrator
        .handle_callback_success(Harness::success(&result, 10_000))
        .await
        .unwrap();

    assert_eq!(h.order_status(&result).await, OrderStatus::Paid);
}

#[tokio::test]
async fn replayed_success_callback_is_rejected() {
    let h = Harness::new(0).await;
    let result = h.checkout(h.bibimbap, 1, None).await.unwrap();
    let callback = Harness::success(&result, 10_000);

    h.orchestrator
        .handle_callback_success(callback.clone())
        .await
        .unwrap();
    let err = h
        .orchestrator
        .handle_callback_success(callback)
        .await
        .unwrap_err();

    assert!(err.is_already_processed());
    assert_eq!(h.gateway.confirm_count(), 1);
    assert_eq!(h.store().payment_count().await, 1);
}

#[tokio::test]
async fn gateway_failure_rolls_back_with_failed_status() {
    let h = Harness::new(10_000).await;
    h.gateway.set_fail_on_confirm(true);
    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();

    let err = h
        .orchestrator
        .handle_callback_success(Harness::success(&result, 47_000))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(h.request_status(&result).await, PaymentRequestStatus::Failed);
    assert_eq!(h.order_status(&result).await, OrderStatus::Canceled);
    assert_eq!(h.balance().await, 10_000);
    assert_eq!(h.store().payment_count().await, 0);
}

#[tokio::test]
async fn failure_callback_refunds_once() {
    let h = Harness::new(10_000).await;
    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();
    let callback = FailureCallback {
        order_token: result.order_id.as_ref().map(|t| t.to_string()),
        code: Some("PAY_PROCESS_CANCELED".to_string()),
        message: Some("User canceled".to_string()),
    };

    let first = h
        .orchestrator
        .handle_callback_failure_or_cancel(callback.clone())
        .await
        .unwrap();
    assert!(first.rollback_completed);
    assert_eq!(first.internal_order_id, result.internal_order_id);
    assert_eq!(first.refunded_points, Points::new(3_000));
    assert!(first.point_refund_message.is_some());

    let second = h
        .orchestrator
        .handle_callback_failure_or_cancel(callback)
        .await
        .unwrap();
    assert!(!second.rollback_completed);
    assert_eq!(second.refunded_points, Points::ZERO);

    assert_eq!(h.balance().await, 10_000);
    assert_eq!(h.request_status(&result).await, PaymentRequestStatus::Canceled);
    assert_eq!(h.order_status(&result).await, OrderStatus::Canceled);
}

#[tokio::test]
async fn concurrent_compensations_refund_once() {
    let h = Harness::new(10_000).await;
    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();
    let request = h
        .orchestrator
        .find_payment_request(result.order_id.as_ref().unwrap().as_str())
        .await
        .unwrap();

    let request_id = request.id;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.sweep_expired(request_id).await.unwrap()
        }));
    }
    let mut expired = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), SweepOutcome::Expired { .. }) {
            expired += 1;
        }
    }

    assert_eq!(expired, 1);
    assert_eq!(h.balance().await, 10_000);
}

#[tokio::test]
async fn callback_for_unknown_token_is_rejected() {
    let h = Harness::new(0).await;

    let err = h
        .orchestrator
        .handle_callback_success(SuccessCallback {
            payment_key: Some("pk".to_string()),
            order_token: Some("TOSS_0000000000000000".to_string()),
            amount: Some(1_000),
        })
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), "RESERVATION_NOT_FOUND");

    let err = h
        .orchestrator
        .handle_callback_success(SuccessCallback::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn caller_must_match_customer() {
    let h = Harness::new(10_000).await;

    let err = h
        .orchestrator
        .process_checkout(CustomerId::new(), &h.payload(h.bulgogi, 1, Some(1_000)))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Forbidden { .. }));
    assert!(
        h.orchestrator
            .orders_for_customer(h.customer_id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(h.balance().await, 10_000);
}

#[tokio::test]
async fn unknown_menu_creates_nothing() {
    let h = Harness::new(0).await;

    let err = h.checkout(MenuId::new(), 1, None).await.unwrap_err();

    assert_eq!(err.reason_code(), "MENU_NOT_FOUND");
    assert!(
        h.orchestrator
            .orders_for_customer(h.customer_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn overlapping_success_callbacks_confirm_once() {
    let gateway = InMemoryGatewayClient::new().with_delay(Duration::from_millis(200));
    let h = Harness::build(10_000, LONG_WINDOW, gateway).await;
    let result = h.checkout(h.bulgogi, 2, Some(3_000)).await.unwrap();

    let (first, second) = tokio::join!(
        h.orchestrator
            .handle_callback_success(Harness::success(&result, 47_000)),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.orchestrator
                .handle_callback_success(Harness::success(&result, 47_000))
                .await
        }
    );

    let confirmation = first.unwrap();
    let err = second.unwrap_err();
    assert!(err.is_in_progress());
    assert_eq!(err.reason_code(), "CONFIRMATION_IN_PROGRESS");
    assert_eq!(h.gateway.confirm_count(), 1);
    assert_eq!(h.order_status(&result).await, OrderStatus::Paid);
    assert_eq!(h.request_status(&result).await, PaymentRequestStatus::Completed);
    assert_eq!(h.store().payment_count().await, 1);
    assert_eq!(h.balance().await, 7_000);

    // Once the first callback is done the reservation reads as settled.
    let err = h
        .orchestrator
        .handle_callback_success(Harness::success(&result, 47_000))
        .await
        .unwrap_err();
    assert!(err.is_already_processed());
    assert_eq!(h.gateway.confirm_count(), 1);
    assert!(!h.orchestrator.sweeper().is_armed(confirmation.payment_request_id));
}

#[tokio::test]
async fn total_above_payment_limit_creates_nothing() {
    let h = Harness::new(10_000).await;

    // 5,000 x 25,000 KRW is above the 100,000,000 KRW limit.
    let err = h.checkout(h.bulgogi, 5_000, Some(1_000)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(err.reason_code(), "LIMIT_EXCEEDED");
    assert!(
        h.orchestrator
            .orders_for_customer(h.customer_id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(h.store().payment_request_count().await, 0);
    assert_eq!(h.store().payment_count().await, 0);
    assert_eq!(h.balance().await, 10_000);
}

#[tokio::test]
async fn overflowing_total_is_rejected_before_any_write() {
    let h = Harness::new(10_000).await;
    let line = json!({ "menuId": h.bibimbap, "quantity": u32::MAX });
    let lines = vec![line; 220_000];
    let payload = json!({
        "customerId": h.customer_id,
        "usePoints": true,
        "pointsToUse": 1_000,
        "orderMenuList": lines,
    })
    .to_string();

    let err = h
        .orchestrator
        .process_checkout(h.customer_id, &payload)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.reason_code(), "INVALID_ORDER");
    assert!(
        h.orchestrator
            .orders_for_customer(h.customer_id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(h.store().payment_count().await, 0);
    assert_eq!(h.balance().await, 10_000);
}

#[tokio::test]
async fn failed_commit_rearms_expiry_timer() {
    let h = Harness::new(0).await;
    // A reservation whose order row is gone.
    let order_id = OrderId::new();
    let request = PaymentRequest::open(
        order_id,
        "TOSS",
        GatewayToken::for_order(order_id),
        Money::new(10_000),
        Utc::now(),
    )
    .unwrap();
    h.store().insert_payment_request(&request).await.unwrap();
    assert!(!h.orchestrator.sweeper().is_armed(request.id));

    let err = h
        .orchestrator
        .handle_callback_success(SuccessCallback {
            payment_key: Some("pk_test_123".to_string()),
            order_token: Some(request.token.to_string()),
            amount: Some(10_000),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Inconsistency);
    assert_eq!(h.gateway.confirm_count(), 0);
    assert!(h.orchestrator.sweeper().is_armed(request.id));
    assert_eq!(
        h.orchestrator.find_payment_request(request.token.as_str()).await.unwrap().status,
        PaymentRequestStatus::Pending
    );
}

#[tokio::test]
async fn gateway_failure_leaves_no_timer_behind() {
    let h = Harness::new(10_000).await;
    h.gateway.set_fail_on_confirm(true);
    let result = h.checkout(h.bulgogi, 1, Some(2_000)).await.unwrap();
    let request = h
        .orchestrator
        .find_payment_request(result.order_id.as_ref().unwrap().as_str())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .handle_callback_success(Harness::success(&result, 23_000))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(h.request_status(&result).await, PaymentRequestStatus::Failed);
    assert!(!h.orchestrator.sweeper().is_armed(request.id));
    assert_eq!(h.balance().await, 10_000);
}
