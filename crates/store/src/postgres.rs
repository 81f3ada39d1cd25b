use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, MenuId, OrderId, PaymentId, PaymentRequestId, StoreId};
use domain::{
    Customer, DomainError, GatewayToken, Menu, Money, Order, OrderNumber, Payment, PaymentMethod,
    PaymentRequest, PaymentRequestStatus, PointBalance, Points, StatusTransition,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        CustomerRepository, MenuRepository, OrderRepository, PaymentRepository,
        PaymentRequestRepository,
    },
};

const PAYMENT_REQUEST_COLUMNS: &str = "id, order_id, provider, token, request_payload, status, \
     requested_at, responded_at, failure_reason";

const PAYMENT_COLUMNS: &str = "id, payment_request_id, order_id, customer_id, total_amount, \
     points_used, pg_transaction_id, approval_code, method, receipt_url, requested_at, approved_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::debug!(max_connections, "postgres pool connected");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("checkout migrations applied");
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let data: serde_json::Value = row.try_get("data")?;
        Ok(serde_json::from_value(data)?)
    }

    fn row_to_customer(row: PgRow) -> Result<Customer> {
        let points: i64 = row.try_get("points")?;
        let points = PointBalance::new(points).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Customer::new(
            CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            row.try_get::<String, _>("name")?,
            points,
        ))
    }

    fn row_to_menu(row: PgRow) -> Result<Menu> {
        Ok(Menu::new(
            MenuId::from_uuid(row.try_get::<Uuid, _>("id")?),
            StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
            row.try_get::<String, _>("name")?,
            Money::new(row.try_get("price")?),
        ))
    }

    fn row_to_payment_request(row: PgRow) -> Result<PaymentRequest> {
        let status: String = row.try_get("status")?;
        let token: String = row.try_get("token")?;
        Ok(PaymentRequest {
            id: PaymentRequestId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            provider: row.try_get("provider")?,
            token: GatewayToken::parse(token).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            request_payload: row.try_get("request_payload")?,
            status: status
                .parse::<PaymentRequestStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            requested_at: row.try_get("requested_at")?,
            responded_at: row.try_get("responded_at")?,
            failure_reason: row.try_get("failure_reason")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let method: String = row.try_get("method")?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            payment_request_id: row
                .try_get::<Option<Uuid>, _>("payment_request_id")?
                .map(PaymentRequestId::from_uuid),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            total_amount: Money::new(row.try_get("total_amount")?),
            points_used: Points::new(row.try_get("points_used")?),
            pg_transaction_id: row.try_get("pg_transaction_id")?,
            approval_code: row.try_get("approval_code")?,
            method: method
                .parse::<PaymentMethod>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            receipt_url: row.try_get("receipt_url")?,
            requested_at: row.try_get::<DateTime<Utc>, _>("requested_at")?,
            approved_at: row.try_get::<DateTime<Utc>, _>("approved_at")?,
        })
    }

    async fn write_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        let data = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_id = $3, data = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_id().map(|id| id.as_uuid()))
        .bind(data)
        .bind(order.updated_at())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    fn map_unique_violation(
        e: sqlx::Error,
        constraint: &str,
        entity: &'static str,
        key: String,
    ) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.constraint() == Some(constraint)
        {
            tracing::warn!(entity, %key, constraint, "unique constraint rejected insert");
            return StoreError::Duplicate { entity, key };
        }
        StoreError::Database(e)
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let data = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, store_id, status, total_price,
                                points_to_use, final_payment_amount, payment_id, data,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.customer_id().as_uuid())
        .bind(order.store_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_price().amount())
        .bind(order.points_to_use().value())
        .bind(order.final_payment_amount().amount())
        .bind(order.payment_id().map(|id| id.as_uuid()))
        .bind(data)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Self::map_unique_violation(
                e,
                "uq_orders_order_number",
                "order number",
                order.order_number().to_string(),
            )
        })?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query("SELECT data FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))?;
        Self::row_to_order(row)
    }

    async fn find_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        sqlx::query("SELECT data FROM orders WHERE order_number = $1")
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT data FROM orders WHERE customer_id = $1 ORDER BY created_at DESC",
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_order<F, T>(&self, id: OrderId, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Order) -> std::result::Result<T, DomainError> + Send + 'static,
        T: Send + 'static,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))?;
        let mut order = Self::row_to_order(row)?;

        // Dropping the transaction on rejection rolls back and releases the lock.
        let out = apply(&mut order)?;
        Self::write_order(&mut tx, &order).await?;

        tx.commit().await?;
        Ok(out)
    }
}

#[async_trait]
impl CustomerRepository for PostgresStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query("INSERT INTO customers (id, name, points) VALUES ($1, $2, $3)")
            .bind(customer.id.as_uuid())
            .bind(&customer.name)
            .bind(customer.points.value())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Self::map_unique_violation(e, "customers_pkey", "customer", customer.id.to_string())
            })?;
        Ok(())
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Customer> {
        let row = sqlx::query("SELECT id, name, points FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("customer", id))?;
        Self::row_to_customer(row)
    }

    async fn update_customer<F, T>(&self, id: CustomerId, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Customer) -> std::result::Result<T, DomainError> + Send + 'static,
        T: Send + 'static,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, name, points FROM customers WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("customer", id))?;
        let mut customer = Self::row_to_customer(row)?;

        let out = apply(&mut customer)?;
        sqlx::query("UPDATE customers SET name = $2, points = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(&customer.name)
            .bind(customer.points.value())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(out)
    }
}

#[async_trait]
impl MenuRepository for PostgresStore {
    async fn insert_menu(&self, menu: &Menu) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO menus (id, store_id, name, price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET store_id = EXCLUDED.store_id, name = EXCLUDED.name, price = EXCLUDED.price
            "#,
        )
        .bind(menu.id.as_uuid())
        .bind(menu.store_id.as_uuid())
        .bind(&menu.name)
        .bind(menu.price.amount())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_menu(&self, id: MenuId) -> Result<Menu> {
        let row = sqlx::query("SELECT id, store_id, name, price FROM menus WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("menu", id))?;
        Self::row_to_menu(row)
    }
}

#[async_trait]
impl PaymentRequestRepository for PostgresStore {
    async fn insert_payment_request(&self, request: &PaymentRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_requests (id, order_id, provider, token, request_payload, status,
                                          requested_at, responded_at, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.order_id.as_uuid())
        .bind(&request.provider)
        .bind(request.token.as_str())
        .bind(&request.request_payload)
        .bind(request.status.as_str())
        .bind(request.requested_at)
        .bind(request.responded_at)
        .bind(&request.failure_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Self::map_unique_violation(
                e,
                "uq_payment_requests_token",
                "payment request token",
                request.token.to_string(),
            )
        })?;
        Ok(())
    }

    async fn get_payment_request(&self, id: PaymentRequestId) -> Result<PaymentRequest> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_REQUEST_COLUMNS} FROM payment_requests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("payment request", id))?;
        Self::row_to_payment_request(row)
    }

    async fn find_payment_request_by_token(
        &self,
        token: &GatewayToken,
    ) -> Result<Option<PaymentRequest>> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_REQUEST_COLUMNS} FROM payment_requests WHERE token = $1 \
             ORDER BY requested_at ASC LIMIT 1"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_payment_request)
        .transpose()
    }

    async fn transition_payment_request(
        &self,
        id: PaymentRequestId,
        transition: StatusTransition,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_requests
            SET status = $2, responded_at = $3, failure_reason = $4
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id.as_uuid())
        .bind(transition.status().as_str())
        .bind(transition.at())
        .bind(transition.failure_reason())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payment_requests WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        if exists {
            tracing::debug!(
                payment_request_id = %id,
                attempted = %transition.status(),
                "payment request transition lost"
            );
            Ok(false)
        } else {
            Err(StoreError::not_found("payment request", id))
        }
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.payment_request_id.map(|id| id.as_uuid()))
        .bind(payment.order_id.as_uuid())
        .bind(payment.customer_id.as_uuid())
        .bind(payment.total_amount.amount())
        .bind(payment.points_used.value())
        .bind(&payment.pg_transaction_id)
        .bind(&payment.approval_code)
        .bind(payment.method.as_str())
        .bind(&payment.receipt_url)
        .bind(payment.requested_at)
        .bind(payment.approved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Self::map_unique_violation(
                e,
                "uq_payments_payment_request",
                "payment for request",
                payment
                    .payment_request_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            )
        })?;
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("payment", id))?;
        Self::row_to_payment(row)
    }

    async fn find_payment_by_request(&self, id: PaymentRequestId) -> Result<Option<Payment>> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_request_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_payment)
        .transpose()
    }
}
