use async_trait::async_trait;
use common::{CustomerId, MenuId, OrderId, PaymentId, PaymentRequestId};
use domain::{
    Customer, DomainError, GatewayToken, Menu, Order, OrderNumber, Payment, PaymentRequest,
    StatusTransition,
};

use crate::Result;

/// Persistence for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a newly placed order.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Loads an order, failing with `NotFound` if it does not exist.
    async fn get_order(&self, id: OrderId) -> Result<Order>;

    async fn find_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;

    /// Lists a customer's orders, newest first.
    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>>;

    /// Applies `apply` to the order under an exclusive lock.
    ///
    /// The change is persisted only if the closure returns `Ok`.
    async fn update_order<F, T>(&self, id: OrderId, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Order) -> std::result::Result<T, DomainError> + Send + 'static,
        T: Send + 'static;
}

/// Persistence for customers and their point balances.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;

    /// Loads a customer, failing with `NotFound` if it does not exist.
    async fn get_customer(&self, id: CustomerId) -> Result<Customer>;

    /// Applies `apply` to the customer under an exclusive lock.
    async fn update_customer<F, T>(&self, id: CustomerId, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Customer) -> std::result::Result<T, DomainError> + Send + 'static,
        T: Send + 'static;
}

/// The menu catalogue, used as the authoritative price source.
#[async_trait]
pub trait MenuRepository: Send + Sync {
    async fn insert_menu(&self, menu: &Menu) -> Result<()>;

    async fn get_menu(&self, id: MenuId) -> Result<Menu>;
}

/// Persistence for payment reservations.
#[async_trait]
pub trait PaymentRequestRepository: Send + Sync {
    /// Stores a new reservation. Fails with `Duplicate` if the token is taken.
    async fn insert_payment_request(&self, request: &PaymentRequest) -> Result<()>;

    async fn get_payment_request(&self, id: PaymentRequestId) -> Result<PaymentRequest>;

    /// Looks up a reservation by its gateway token.
    async fn find_payment_request_by_token(
        &self,
        token: &GatewayToken,
    ) -> Result<Option<PaymentRequest>>;

    /// Atomically applies `transition` if the reservation is still PENDING.
    ///
    /// Returns `Ok(false)` without writing if it is already terminal, and
    /// `NotFound` if it does not exist.
    async fn transition_payment_request(
        &self,
        id: PaymentRequestId,
        transition: StatusTransition,
    ) -> Result<bool>;
}

/// Persistence for settled payments.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment(&self, id: PaymentId) -> Result<Payment>;

    async fn find_payment_by_request(&self, id: PaymentRequestId) -> Result<Option<Payment>>;
}

/// All repositories the checkout services need, behind one backend type.
pub trait Store:
    OrderRepository
    + CustomerRepository
    + MenuRepository
    + PaymentRequestRepository
    + PaymentRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> Store for T where
    T: OrderRepository
        + CustomerRepository
        + MenuRepository
        + PaymentRequestRepository
        + PaymentRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}
