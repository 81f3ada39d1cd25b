use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, MenuId, OrderId, PaymentId, PaymentRequestId};
use domain::{
    Customer, DomainError, GatewayToken, Menu, Order, OrderNumber, Payment, PaymentRequest,
    StatusTransition,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{
        CustomerRepository, MenuRepository, OrderRepository, PaymentRepository,
        PaymentRequestRepository,
    },
};

#[derive(Default)]
struct PaymentRequestTable {
    rows: HashMap<PaymentRequestId, PaymentRequest>,
    by_token: HashMap<String, PaymentRequestId>,
}

/// In-memory store implementation for tests and local runs.
///
/// Each table sits behind its own `RwLock`; updates take the write lock for
/// the whole read-modify-write so concurrent writers to the same entity are
/// serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
    menus: Arc<RwLock<HashMap<MenuId, Menu>>>,
    payment_requests: Arc<RwLock<PaymentRequestTable>>,
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }

    /// Returns the number of stored payment requests.
    pub async fn payment_request_count(&self) -> usize {
        self.payment_requests.read().await.rows.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: order.id().to_string(),
            });
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn find_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.order_number() == number)
            .cloned())
    }

    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.customer_id() == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn update_order<F, T>(&self, id: OrderId, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Order) -> std::result::Result<T, DomainError> + Send + 'static,
        T: Send + 'static,
    {
        let mut orders = self.orders.write().await;
        let current = orders
            .get(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;

        // Work on a copy so a rejected change leaves the stored order intact.
        let mut next = current.clone();
        let out = apply(&mut next)?;
        orders.insert(id, next);
        Ok(out)
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        let mut customers = self.customers.write().await;
        if customers.contains_key(&customer.id) {
            return Err(StoreError::Duplicate {
                entity: "customer",
                key: customer.id.to_string(),
            });
        }
        customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Customer> {
        self.customers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("customer", id))
    }

    async fn update_customer<F, T>(&self, id: CustomerId, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Customer) -> std::result::Result<T, DomainError> + Send + 'static,
        T: Send + 'static,
    {
        let mut customers = self.customers.write().await;
        let current = customers
            .get(&id)
            .ok_or_else(|| StoreError::not_found("customer", id))?;

        let mut next = current.clone();
        let out = apply(&mut next)?;
        customers.insert(id, next);
        Ok(out)
    }
}

#[async_trait]
impl MenuRepository for InMemoryStore {
    async fn insert_menu(&self, menu: &Menu) -> Result<()> {
        self.menus.write().await.insert(menu.id, menu.clone());
        Ok(())
    }

    async fn get_menu(&self, id: MenuId) -> Result<Menu> {
        self.menus
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("menu", id))
    }
}

#[async_trait]
impl PaymentRequestRepository for InMemoryStore {
    async fn insert_payment_request(&self, request: &PaymentRequest) -> Result<()> {
        let mut table = self.payment_requests.write().await;
        let token = request.token.as_str().to_string();
        if table.by_token.contains_key(&token) {
            tracing::warn!(%token, "duplicate payment request token rejected");
            return Err(StoreError::Duplicate {
                entity: "payment request token",
                key: token,
            });
        }
        table.by_token.insert(token, request.id);
        table.rows.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_payment_request(&self, id: PaymentRequestId) -> Result<PaymentRequest> {
        self.payment_requests
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("payment request", id))
    }

    async fn find_payment_request_by_token(
        &self,
        token: &GatewayToken,
    ) -> Result<Option<PaymentRequest>> {
        let table = self.payment_requests.read().await;
        Ok(table
            .by_token
            .get(token.as_str())
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn transition_payment_request(
        &self,
        id: PaymentRequestId,
        transition: StatusTransition,
    ) -> Result<bool> {
        let mut table = self.payment_requests.write().await;
        let request = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("payment request", id))?;
        let won = request.apply_transition(&transition);
        if !won {
            tracing::debug!(
                payment_request_id = %id,
                current = %request.status,
                attempted = %transition.status(),
                "payment request transition lost"
            );
        }
        Ok(won)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(StoreError::Duplicate {
                entity: "payment",
                key: payment.id.to_string(),
            });
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        self.payments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("payment", id))
    }

    async fn find_payment_by_request(&self, id: PaymentRequestId) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.payment_request_id == Some(id))
            .cloned())
    }
}
