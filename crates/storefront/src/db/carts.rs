//! Server-side cart persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use atelier_core::{CartItemId, ProductId, UserId};

use super::{PgStore, RepositoryError};
use crate::models::{CartItem, CartLine, ProductSummary};

/// Cart rows, unique per `(user, product, size)`.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The user's cart rows joined with their products, oldest first.
    async fn list_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError>;

    /// Insert a row or add to the existing row for the same triple, as one
    /// atomic step. The stored quantity never exceeds `max_quantity`.
    ///
    /// Returns the row and whether it was newly inserted.
    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: Option<&str>,
        quantity: i32,
        max_quantity: i32,
    ) -> Result<(CartItem, bool), RepositoryError>;

    /// Set the quantity of one of the user's rows. Returns `None` if the row
    /// does not exist or belongs to someone else.
    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: i32,
    ) -> Result<Option<CartItem>, RepositoryError>;

    /// Delete one of the user's rows. Returns whether anything was deleted.
    async fn remove_cart_item(&self, user_id: UserId, id: CartItemId)
    -> Result<bool, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: CartItemId,
    user_id: UserId,
    product_id: ProductId,
    quantity: i32,
    size: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: row.quantity,
            size: row.size,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    item: CartItemRow,
    inserted: bool,
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    #[sqlx(flatten)]
    item: CartItemRow,
    product_name: String,
    product_price: Decimal,
    product_image_url: Option<String>,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        let product = ProductSummary {
            id: row.item.product_id,
            name: row.product_name,
            price: row.product_price,
            image_url: row.product_image_url,
        };
        Self::new(row.item.into(), product)
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn list_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT c.id, c.user_id, c.product_id, c.quantity, c.size, c.created_at, c.updated_at,
                   p.name AS product_name, p.price AS product_price,
                   p.image_url AS product_image_url
            FROM cart_item c
            JOIN product p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(CartLine::from).collect())
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: Option<&str>,
        quantity: i32,
        max_quantity: i32,
    ) -> Result<(CartItem, bool), RepositoryError> {
        // xmax is 0 only for a row version created by this statement's insert
        let row = sqlx::query_as::<_, UpsertRow>(
            r"
            INSERT INTO cart_item (user_id, product_id, quantity, size)
            VALUES ($1, $2, LEAST($3, $5), $4)
            ON CONFLICT ON CONSTRAINT cart_item_user_product_size_key DO UPDATE
            SET quantity = LEAST(cart_item.quantity + EXCLUDED.quantity, $5),
                updated_at = NOW()
            RETURNING id, user_id, product_id, quantity, size, created_at, updated_at,
                      (xmax = 0) AS inserted
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .bind(size)
        .bind(max_quantity)
        .fetch_one(self.pool())
        .await?;

        Ok((row.item.into(), row.inserted))
    }

    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: i32,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let row = sqlx::query_as::<_, CartItemRow>(
            r"
            UPDATE cart_item
            SET quantity = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, product_id, quantity, size, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(quantity)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(CartItem::from))
    }

    async fn remove_cart_item(
        &self,
        user_id: UserId,
        id: CartItemId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_item WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
