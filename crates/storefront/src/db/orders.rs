//! Order and payment reconciliation persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use atelier_core::{
    AddressId, Email, OrderId, OrderItemId, OrderStatus, ProductId, ReconciliationId, UserId,
};

use super::{PgStore, RepositoryError};
use crate::models::{
    AdminOrder, NewOrder, NewReconciliation, Order, OrderCustomer, OrderInsert, OrderItem,
    OrderWithItems, Reconciliation,
};

/// Orders, their lines, and reconciliation records.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Write an order, its items, and delete the owner's cart rows for the
    /// ordered products, all in one transaction.
    ///
    /// If an order with the same `payment_id` already exists nothing is
    /// written and the existing order is returned as `OrderInsert::Existing`.
    async fn create_order(&self, order: &NewOrder) -> Result<OrderInsert, RepositoryError>;

    /// Get an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError>;

    /// Get the order created for a payment.
    async fn get_order_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError>;

    /// The user's most recent orders, newest first.
    async fn list_user_orders(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<OrderWithItems>, RepositoryError>;

    /// The most recent orders of all users, newest first.
    async fn list_all_orders(&self, limit: i64) -> Result<Vec<AdminOrder>, RepositoryError>;

    /// Move an order from `from` to `to`. Returns `None` if the order does not
    /// exist or is no longer in status `from`.
    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Record a captured payment whose order could not be written.
    async fn create_reconciliation(
        &self,
        record: &NewReconciliation,
    ) -> Result<Reconciliation, RepositoryError>;

    /// Unresolved reconciliation records, oldest first.
    async fn list_open_reconciliations(&self) -> Result<Vec<Reconciliation>, RepositoryError>;

    /// Mark a record resolved. Returns `None` if it does not exist.
    async fn resolve_reconciliation(
        &self,
        id: ReconciliationId,
    ) -> Result<Option<Reconciliation>, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    total_amount: Decimal,
    status: OrderStatus,
    payment_id: String,
    address_id: Option<AddressId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            total_amount: row.total_amount,
            status: row.status,
            payment_id: row.payment_id,
            address_id: row.address_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: Option<ProductId>,
    product_name: String,
    quantity: i32,
    price: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            price: row.price,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AdminOrderRow {
    #[sqlx(flatten)]
    order: OrderRow,
    customer_name: String,
    customer_email: String,
}

#[derive(sqlx::FromRow)]
struct ReconciliationRow {
    id: ReconciliationId,
    payment_id: String,
    user_id: UserId,
    amount: Decimal,
    error: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<ReconciliationRow> for Reconciliation {
    fn from(row: ReconciliationRow) -> Self {
        Self {
            id: row.id,
            payment_id: row.payment_id,
            user_id: row.user_id,
            amount: row.amount,
            error: row.error,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        }
    }
}

impl PgStore {
    /// Load the items of `orders` with one query and pair them up.
    async fn attach_items(&self, orders: Vec<Order>) -> Result<Vec<OrderWithItems>, RepositoryError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = orders.iter().map(|o| o.id.as_i32()).collect();
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, product_name, quantity, price
            FROM order_item
            WHERE order_id = ANY($1)
            ORDER BY order_id, id
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            items.entry(row.order_id).or_default().push(row.into());
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderWithItems {
                items: items.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderInsert, RepositoryError> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO customer_order (user_id, total_amount, status, payment_id, address_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (payment_id) DO NOTHING
            RETURNING id, user_id, total_amount, status, payment_id, address_id,
                      created_at, updated_at
            ",
        )
        .bind(order.user_id)
        .bind(order.total_amount)
        .bind(order.status)
        .bind(&order.payment_id)
        .bind(order.address_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            let existing = self
                .get_order_by_payment(&order.payment_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            return Ok(OrderInsert::Existing(existing));
        };

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let item_row = sqlx::query_as::<_, OrderItemRow>(
                r"
                INSERT INTO order_item (order_id, product_id, product_name, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, order_id, product_id, product_name, quantity, price
                ",
            )
            .bind(row.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(OrderItem::from(item_row));
        }

        let product_ids: Vec<i32> = order.items.iter().map(|i| i.product_id.as_i32()).collect();
        sqlx::query("DELETE FROM cart_item WHERE user_id = $1 AND product_id = ANY($2)")
            .bind(order.user_id)
            .bind(&product_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(OrderInsert::Created(OrderWithItems {
            order: row.into(),
            items,
        }))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, total_amount, status, payment_id, address_id,
                   created_at, updated_at
            FROM customer_order
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(self.attach_items(vec![row.into()]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn get_order_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, total_amount, status, payment_id, address_id,
                   created_at, updated_at
            FROM customer_order
            WHERE payment_id = $1
            ",
        )
        .bind(payment_id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(self.attach_items(vec![row.into()]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_user_orders(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, user_id, total_amount, status, payment_id, address_id,
                   created_at, updated_at
            FROM customer_order
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        self.attach_items(rows.into_iter().map(Order::from).collect())
            .await
    }

    async fn list_all_orders(&self, limit: i64) -> Result<Vec<AdminOrder>, RepositoryError> {
        let rows = sqlx::query_as::<_, AdminOrderRow>(
            r"
            SELECT o.id, o.user_id, o.total_amount, o.status, o.payment_id, o.address_id,
                   o.created_at, o.updated_at,
                   u.name AS customer_name, u.email AS customer_email
            FROM customer_order o
            JOIN app_user u ON u.id = o.user_id
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let mut customers = Vec::with_capacity(rows.len());
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let email = Email::parse(&row.customer_email).map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;
            customers.push(OrderCustomer {
                id: row.order.user_id,
                name: row.customer_name,
                email,
            });
            orders.push(Order::from(row.order));
        }

        let orders = self.attach_items(orders).await?;
        Ok(orders
            .into_iter()
            .zip(customers)
            .map(|(order, customer)| AdminOrder { order, customer })
            .collect())
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            UPDATE customer_order
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING id, user_id, total_amount, status, payment_id, address_id,
                      created_at, updated_at
            ",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Order::from))
    }

    async fn create_reconciliation(
        &self,
        record: &NewReconciliation,
    ) -> Result<Reconciliation, RepositoryError> {
        let row = sqlx::query_as::<_, ReconciliationRow>(
            r"
            INSERT INTO payment_reconciliation (payment_id, user_id, amount, error)
            VALUES ($1, $2, $3, $4)
            RETURNING id, payment_id, user_id, amount, error, created_at, resolved_at
            ",
        )
        .bind(&record.payment_id)
        .bind(record.user_id)
        .bind(record.amount)
        .bind(&record.error)
        .fetch_one(self.pool())
        .await?;

        Ok(row.into())
    }

    async fn list_open_reconciliations(&self) -> Result<Vec<Reconciliation>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReconciliationRow>(
            r"
            SELECT id, payment_id, user_id, amount, error, created_at, resolved_at
            FROM payment_reconciliation
            WHERE resolved_at IS NULL
            ORDER BY created_at, id
            ",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Reconciliation::from).collect())
    }

    async fn resolve_reconciliation(
        &self,
        id: ReconciliationId,
    ) -> Result<Option<Reconciliation>, RepositoryError> {
        let row = sqlx::query_as::<_, ReconciliationRow>(
            r"
            UPDATE payment_reconciliation
            SET resolved_at = COALESCE(resolved_at, NOW())
            WHERE id = $1
            RETURNING id, payment_id, user_id, amount, error, created_at, resolved_at
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Reconciliation::from))
    }
}
