//! Per-reservation expiry timers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::PaymentRequestId;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Fires once per reservation after a fixed delay unless disarmed first.
///
/// Timers are plain tokio tasks sleeping on the runtime's timer wheel, so an
/// armed reservation costs no worker thread. Expired ids are delivered on the
/// channel returned by [`TimeoutSweeper::new`]; whoever owns the receiver
/// decides what expiry means.
#[derive(Debug)]
pub struct TimeoutSweeper {
    delay: Duration,
    timers: Mutex<HashMap<PaymentRequestId, AbortHandle>>,
    expired_tx: mpsc::UnboundedSender<PaymentRequestId>,
}

impl TimeoutSweeper {
    /// Creates a sweeper and the receiving end of its expiry channel.
    pub fn new(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<PaymentRequestId>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let sweeper = Arc::new(Self {
            delay,
            timers: Mutex::new(HashMap::new()),
            expired_tx,
        });
        (sweeper, expired_rx)
    }

    /// Returns the configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<PaymentRequestId, AbortHandle>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the timer for a reservation, replacing any existing one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(self: &Arc<Self>, id: PaymentRequestId) {
        let weak = Arc::downgrade(self);
        let tx = self.expired_tx.clone();
        let delay = self.delay;

        // Hold the lock across spawn so the task cannot remove its entry
        // before it is inserted.
        let mut timers = self.timers();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(sweeper) = weak.upgrade() {
                sweeper.timers().remove(&id);
            }
            if tx.send(id).is_err() {
                tracing::debug!(payment_request_id = %id, "expiry receiver gone");
            }
        });
        if let Some(previous) = timers.insert(id, handle.abort_handle()) {
            previous.abort();
        }
        tracing::debug!(payment_request_id = %id, delay_ms = delay.as_millis() as u64, "timer armed");
    }

    /// Cancels the timer for a reservation.
    ///
    /// Returns true if a pending timer was cancelled.
    pub fn disarm(&self, id: PaymentRequestId) -> bool {
        match self.timers().remove(&id) {
            Some(handle) => {
                handle.abort();
                tracing::debug!(payment_request_id = %id, "timer disarmed");
                true
            }
            None => false,
        }
    }

    /// Returns the number of armed timers.
    pub fn armed_count(&self) -> usize {
        self.timers().len()
    }

    pub fn is_armed(&self, id: PaymentRequestId) -> bool {
        self.timers().contains_key(&id)
    }
}

impl Drop for TimeoutSweeper {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}
