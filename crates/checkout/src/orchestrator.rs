//! The checkout saga.
//!
//! Checkout creates a PENDING order, debits points and opens a reservation.
//! The reservation is then settled by whichever comes first: the gateway's
//! success callback, its failure/cancel callback, or the expiry timer. Every
//! path that does not end in a payment goes through [`RollbackCompensator`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use common::{CustomerId, OrderId, PaymentRequestId};
use domain::{
    GatewayToken, Order, OrderNumber, Payment, PaymentRequest, PaymentRequestStatus, Points,
    Settlement, StatusTransition,
};
use store::Store;

use crate::compensator::{RollbackCompensator, RollbackTrigger};
use crate::error::{CallbackRejection, CheckoutError, Result};
use crate::ledger::PointLedger;
use crate::lifecycle::{OrderLifecycle, PendingOrder};
use crate::request::{
    CheckoutRequest, CheckoutResult, FailureCallback, FailureOutcome, PaymentConfirmation,
    SuccessCallback, SweepOutcome,
};
use crate::requests::PaymentRequestStore;
use crate::services::{Collaborators, ConfirmRequest, CustomerAuthenticator, GatewayClient};
use crate::settings::CheckoutSettings;
use crate::sweeper::TimeoutSweeper;
use crate::validator::CallbackValidator;

/// Failure reason recorded on reservations the sweeper expires.
pub const TIMEOUT_REASON: &str = "Payment timeout - no response within window";

/// Runs checkouts and settles their reservations.
pub struct CheckoutOrchestrator<S> {
    store: S,
    settings: CheckoutSettings,
    gateway: Arc<dyn GatewayClient>,
    authenticator: Arc<dyn CustomerAuthenticator>,
    sweeper: Arc<TimeoutSweeper>,
    ledger: PointLedger<S>,
    lifecycle: OrderLifecycle<S>,
    requests: PaymentRequestStore<S>,
    validator: CallbackValidator<S>,
    compensator: RollbackCompensator<S>,
    /// Reservations a success callback is currently confirming.
    confirming: Mutex<HashSet<PaymentRequestId>>,
}

/// Exclusive right to confirm one reservation; released on drop.
struct ConfirmClaim<'a> {
    confirming: &'a Mutex<HashSet<PaymentRequestId>>,
    id: PaymentRequestId,
}

impl Drop for ConfirmClaim<'_> {
    fn drop(&mut self) {
        self.confirming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl<S: Store> CheckoutOrchestrator<S> {
    /// Wires the saga and starts the expiry worker.
    ///
    /// Must be called from within a tokio runtime. The worker holds only a
    /// weak reference and stops once the orchestrator is dropped.
    pub fn start(store: S, collaborators: Collaborators, settings: CheckoutSettings) -> Arc<Self> {
        let (sweeper, mut expired) = TimeoutSweeper::new(settings.reservation_window);

        let requests = PaymentRequestStore::new(store.clone(), sweeper.clone());
        let lifecycle = OrderLifecycle::new(store.clone(), collaborators.cart.clone())
            .with_max_amount(settings.max_amount);
        let ledger = PointLedger::new(store.clone());
        let validator = CallbackValidator::new(requests.clone(), settings.max_amount);
        let compensator = RollbackCompensator::new(
            store.clone(),
            requests.clone(),
            lifecycle.clone(),
            ledger.clone(),
        );

        let orchestrator = Arc::new(Self {
            store,
            settings,
            gateway: collaborators.gateway,
            authenticator: collaborators.authenticator,
            sweeper,
            ledger,
            lifecycle,
            requests,
            validator,
            compensator,
            confirming: Mutex::new(HashSet::new()),
        });

        let weak = Arc::downgrade(&orchestrator);
        tokio::spawn(async move {
            while let Some(id) = expired.recv().await {
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.sweep_expired(id).await {
                        tracing::error!(payment_request_id = %id, error = %e, "expiry sweep failed");
                    }
                });
            }
            tracing::debug!("expiry worker stopped");
        });

        tracing::info!(
            provider = %orchestrator.settings.provider,
            window_secs = orchestrator.settings.reservation_window.as_secs(),
            max_amount = orchestrator.settings.max_amount.amount(),
            "checkout orchestrator started"
        );
        orchestrator
    }

    /// Creates a PENDING order from a raw checkout payload.
    ///
    /// Any failure after the order exists rolls back what was applied before
    /// the error is returned.
    #[tracing::instrument(skip(self, raw))]
    pub async fn process_checkout(&self, caller: CustomerId, raw: &str) -> Result<CheckoutResult> {
        let started = Instant::now();
        metrics::counter!("checkout_requests_total").increment(1);

        let result = self.run_checkout(caller, raw).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(checkout) => tracing::info!(
                order_id = %checkout.internal_order_id,
                amount = checkout.amount.amount(),
                points_used = checkout.points_used.value(),
                "checkout accepted"
            ),
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.reason_code())
                    .increment(1);
                tracing::warn!(error = %e, code = e.reason_code(), "checkout failed");
            }
        }
        result
    }

    async fn run_checkout(&self, caller: CustomerId, raw: &str) -> Result<CheckoutResult> {
        let request = CheckoutRequest::parse(raw)?;
        let customer_id = request.customer_id;

        self.authenticator
            .authorize(caller, customer_id)
            .await
            .map_err(|_| CheckoutError::Forbidden {
                claimed: customer_id.to_string(),
            })?;
        let customer = self.store.get_customer(customer_id).await?;

        tracing::debug!(
            claimed_total = ?request.total_price,
            claimed_final = ?request.final_payment_amount,
            "client totals ignored; pricing from the catalogue"
        );

        let order = self
            .lifecycle
            .create_pending(PendingOrder {
                customer_id,
                store_id: request.store_id,
                lines: request.line_requests(),
                order_type: request.order_type()?,
                use_points: request.use_points,
                points_to_use: request.points(),
            })
            .await?;

        if order.has_point_usage()
            && let Err(e) = self.ledger.reserve(customer_id, order.points_to_use()).await
        {
            // Nothing else has been applied yet: cancelling the order is the
            // whole rollback.
            if let Err(cancel_err) = self.lifecycle.cancel(order.id()).await {
                tracing::error!(
                    order_id = %order.id(),
                    error = %cancel_err,
                    "order cancel failed after point reservation failure"
                );
            }
            return Err(e);
        }

        let order_token = if order.final_payment_amount().is_positive() {
            let token = GatewayToken::for_order(order.id());
            if let Err(e) = self
                .requests
                .reserve(
                    order.id(),
                    &self.settings.provider,
                    token.clone(),
                    order.final_payment_amount(),
                )
                .await
            {
                self.rollback_checkout(order.id()).await;
                return Err(e);
            }
            Some(token)
        } else if let Err(e) = self.settle_with_points(&order).await {
            self.rollback_checkout(order.id()).await;
            return Err(e);
        } else {
            None
        };

        let status = self.lifecycle.get(order.id()).await?.status();
        Ok(CheckoutResult {
            order_id: order_token,
            internal_order_id: order.id(),
            order_number: order.order_number().clone(),
            amount: order.final_payment_amount(),
            original_amount: order.total_price(),
            customer_id,
            customer_name: customer.name,
            client_key: self.settings.client_key.clone(),
            use_points: order.use_points(),
            points_used: if order.has_point_usage() {
                order.points_to_use()
            } else {
                Points::ZERO
            },
            status,
        })
    }

    /// Settles an order whose points cover the whole total.
    async fn settle_with_points(&self, order: &Order) -> Result<()> {
        let payment = Payment::points_only(order, Utc::now());
        self.store.insert_payment(&payment).await?;
        self.lifecycle.mark_paid(order.id(), payment.id).await?;

        tracing::info!(
            order_id = %order.id(),
            payment_id = %payment.id,
            points = order.points_to_use().value(),
            "order settled with points only"
        );
        Ok(())
    }

    async fn rollback_checkout(&self, order_id: OrderId) {
        match self
            .compensator
            .compensate_by_order_id(order_id, RollbackTrigger::Checkout)
            .await
        {
            Ok(result) if !result.warnings.is_empty() => tracing::error!(
                %order_id,
                warnings = ?result.warnings,
                "checkout rollback completed with warnings"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!(%order_id, error = %e, "checkout rollback failed"),
        }
    }

    /// Confirms a reserved charge and commits the payment.
    ///
    /// Only one callback per reservation reaches the gateway at a time; an
    /// overlapping one is refused with
    /// [`CallbackRejection::ConfirmationInProgress`]. A gateway failure rolls
    /// the checkout back with reason FAILED. If the reservation expired while
    /// the gateway was confirming, the charge is reported as
    /// [`CallbackRejection::AlreadyProcessed`] and no payment is written. Any
    /// other failure leaves the reservation PENDING with its timer re-armed.
    #[tracing::instrument(skip(self, callback), fields(token = callback.order_token.as_deref().unwrap_or("")))]
    pub async fn handle_callback_success(
        &self,
        callback: SuccessCallback,
    ) -> Result<PaymentConfirmation> {
        let result = self.commit_payment(callback).await;
        let outcome = match &result {
            Ok(_) => "completed",
            Err(e) if e.is_in_progress() => "in_progress",
            Err(CheckoutError::Gateway(_)) => "gateway_failed",
            Err(_) => "rejected",
        };
        metrics::counter!("payment_callbacks_total", "outcome" => outcome).increment(1);
        if let Err(e) = &result {
            tracing::warn!(error = %e, code = e.reason_code(), "success callback rejected");
        }
        result
    }

    fn claim_confirmation(&self, id: PaymentRequestId) -> Option<ConfirmClaim<'_>> {
        let mut confirming = self
            .confirming
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        confirming.insert(id).then_some(ConfirmClaim {
            confirming: &self.confirming,
            id,
        })
    }

    async fn commit_payment(&self, callback: SuccessCallback) -> Result<PaymentConfirmation> {
        let request = self
            .validator
            .validate(callback.order_token.as_deref(), callback.amount)
            .await?;
        let payment_key = callback
            .payment_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(CallbackRejection::MissingFields("paymentKey"))?;

        let Some(_claim) = self.claim_confirmation(request.id) else {
            return Err(CallbackRejection::ConfirmationInProgress.into());
        };
        // A callback that held the claim may have settled it meanwhile.
        let request = self.requests.get(request.id).await?;
        if !request.is_pending() {
            return Err(CallbackRejection::AlreadyProcessed {
                status: request.status,
            }
            .into());
        }

        self.sweeper.disarm(request.id);
        let request_id = request.id;
        let result = self.confirm_and_commit(request, payment_key).await;
        if result.is_err() {
            self.rearm_if_pending(request_id).await;
        }
        result
    }

    /// Restarts the expiry timer for a reservation a failed commit left
    /// PENDING.
    async fn rearm_if_pending(&self, id: PaymentRequestId) {
        match self.requests.get(id).await {
            Ok(request) if !request.is_pending() => {}
            Ok(_) => {
                tracing::warn!(payment_request_id = %id, "commit failed; expiry timer re-armed");
                self.sweeper.arm(id);
            }
            Err(e) => {
                tracing::warn!(payment_request_id = %id, error = %e, "commit failed; expiry timer re-armed");
                self.sweeper.arm(id);
            }
        }
    }

    async fn confirm_and_commit(
        &self,
        request: PaymentRequest,
        payment_key: String,
    ) -> Result<PaymentConfirmation> {
        let order = self.resolve_order(&request).await?;
        self.resolve_customer(&order).await?;
        let amount = request.reserved_amount()?;

        let receipt = match self
            .gateway
            .confirm(ConfirmRequest {
                payment_key,
                order_token: request.token.clone(),
                amount,
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "gateway confirmation failed");
                match self
                    .compensator
                    .compensate(
                        request.id,
                        PaymentRequestStatus::Failed,
                        Some(format!("gateway: {e}")),
                        RollbackTrigger::GatewayFailure,
                    )
                    .await
                {
                    Ok(result) => tracing::info!(
                        order_id = %order.id(),
                        compensated = result.is_compensated(),
                        "gateway failure rolled back"
                    ),
                    Err(comp_err) => tracing::error!(
                        order_id = %order.id(),
                        error = %comp_err,
                        "rollback after gateway failure failed"
                    ),
                }
                return Err(e.into());
            }
        };

        if receipt.total_amount != amount {
            tracing::warn!(
                reserved = amount.amount(),
                confirmed = receipt.total_amount.amount(),
                "gateway confirmed a different amount"
            );
        }

        let won = self
            .requests
            .transition(request.id, StatusTransition::completed(Utc::now()))
            .await?;
        if !won {
            let status = self.requests.get(request.id).await?.status;
            metrics::counter!("late_confirmations_total").increment(1);
            tracing::error!(
                order_id = %order.id(),
                payment_request_id = %request.id,
                payment_key = %receipt.payment_key,
                %status,
                "gateway confirmed a charge for a reservation that is no longer pending"
            );
            return Err(CallbackRejection::AlreadyProcessed { status }.into());
        }

        let approved_at = receipt.approved_at;
        let method = receipt.method;
        let payment = Payment::settled(
            &request,
            &order,
            Settlement {
                pg_transaction_id: receipt.payment_key,
                approval_code: Some(receipt.gateway_order_id),
                method,
                receipt_url: receipt.receipt_url,
                approved_at,
            },
        );
        self.store.insert_payment(&payment).await?;
        let order = self.lifecycle.mark_paid(order.id(), payment.id).await?;

        tracing::info!(
            order_id = %order.id(),
            payment_id = %payment.id,
            amount = amount.amount(),
            method = method.as_str(),
            "payment committed"
        );
        Ok(PaymentConfirmation {
            payment_id: payment.id,
            payment_request_id: request.id,
            order_id: request.token,
            internal_order_id: order.id(),
            order_number: order.order_number().clone(),
            amount,
            points_used: payment.points_used,
            method,
            approved_at,
        })
    }

    /// Rolls back a checkout the storefront reported as failed or canceled.
    #[tracing::instrument(skip(self, callback), fields(code = callback.code.as_deref().unwrap_or("")))]
    pub async fn handle_callback_failure_or_cancel(
        &self,
        callback: FailureCallback,
    ) -> Result<FailureOutcome> {
        let token = callback
            .order_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(CallbackRejection::MissingFields("orderId"))?;
        let request = self
            .requests
            .find_by_token(token)
            .await?
            .ok_or_else(|| CallbackRejection::ReservationNotFound(token.to_string()))?;

        let result = self
            .compensator
            .compensate(
                request.id,
                PaymentRequestStatus::Canceled,
                Some(callback.reason()),
                RollbackTrigger::CallbackFailure,
            )
            .await?;
        self.sweeper.disarm(request.id);

        let outcome = if result.is_compensated() {
            "canceled"
        } else {
            "ignored"
        };
        metrics::counter!("payment_callbacks_total", "outcome" => outcome).increment(1);

        let refunded = result.refunded_points;
        Ok(FailureOutcome {
            order_id: token.to_string(),
            internal_order_id: request.order_id,
            error_code: callback.code,
            error_message: callback.message,
            rollback_completed: result.is_compensated(),
            refunded_points: refunded,
            point_refund_message: refunded
                .is_positive()
                .then(|| format!("{} points used for this order have been refunded", refunded.value())),
        })
    }

    /// Expires a reservation whose window elapsed without a callback.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, payment_request_id: PaymentRequestId) -> Result<SweepOutcome> {
        let request = match self.requests.get(payment_request_id).await {
            Ok(request) => request,
            Err(CheckoutError::NotFound { .. }) => {
                tracing::warn!("expired reservation no longer exists");
                return Ok(SweepOutcome::Missing);
            }
            Err(e) => return Err(e),
        };
        if !request.is_pending() {
            tracing::debug!(status = %request.status, "reservation settled before expiry");
            return Ok(SweepOutcome::AlreadyTerminal);
        }

        let result = self
            .compensator
            .compensate(
                payment_request_id,
                PaymentRequestStatus::Canceled,
                Some(TIMEOUT_REASON.to_string()),
                RollbackTrigger::Timeout,
            )
            .await?;
        if !result.is_compensated() {
            return Ok(SweepOutcome::AlreadyTerminal);
        }

        metrics::counter!("reservations_expired_total").increment(1);
        tracing::info!(
            order_id = %result.order_id,
            refunded = result.refunded_points.value(),
            "reservation expired"
        );
        Ok(SweepOutcome::Expired {
            order_id: result.order_id,
            refunded_points: result.refunded_points,
        })
    }

    async fn resolve_order(&self, request: &PaymentRequest) -> Result<Order> {
        match self.lifecycle.get(request.order_id).await {
            Err(CheckoutError::NotFound { .. }) => {
                tracing::error!(
                    order_id = %request.order_id,
                    payment_request_id = %request.id,
                    "reservation references a missing order"
                );
                Err(CheckoutError::Inconsistency(format!(
                    "order {} of payment request {} does not exist",
                    request.order_id, request.id
                )))
            }
            other => other,
        }
    }

    async fn resolve_customer(&self, order: &Order) -> Result<()> {
        match self.store.get_customer(order.customer_id()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::error!(
                    order_id = %order.id(),
                    customer_id = %order.customer_id(),
                    "order references a missing customer"
                );
                Err(CheckoutError::Inconsistency(format!(
                    "customer {} of order {} does not exist",
                    order.customer_id(),
                    order.id()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves a PAID order to COMPLETED.
    pub async fn complete_order(&self, order_id: OrderId) -> Result<Order> {
        self.lifecycle.complete(order_id).await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.lifecycle.get(order_id).await
    }

    pub async fn find_order_by_number(&self, number: &OrderNumber) -> Result<Order> {
        self.lifecycle.find_by_number(number).await
    }

    pub async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        self.lifecycle.list_for_customer(customer_id).await
    }

    /// Looks up a reservation by its gateway token.
    pub async fn find_payment_request(&self, token: &str) -> Result<PaymentRequest> {
        self.requests
            .find_by_token(token)
            .await?
            .ok_or_else(|| CheckoutError::not_found("payment request", token))
    }

    pub async fn point_balance(&self, customer_id: CustomerId) -> Result<Points> {
        self.ledger.balance(customer_id).await
    }

    pub fn sweeper(&self) -> &Arc<TimeoutSweeper> {
        &self.sweeper
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
