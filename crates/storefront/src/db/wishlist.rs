//! Wishlist persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use atelier_core::{ProductId, UserId, WishlistItemId};

use super::{PgStore, RepositoryError};
use crate::models::{ProductSummary, WishlistEntry, WishlistToggle};

/// Wishlist rows, unique per `(user, product)`.
#[async_trait]
pub trait WishlistStore: Send + Sync {
    /// The user's wishlist joined with products, newest first.
    async fn list_wishlist(&self, user_id: UserId) -> Result<Vec<WishlistEntry>, RepositoryError>;

    /// Remove the `(user, product)` row if present, otherwise insert it, in
    /// one transaction.
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    async fn toggle_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<WishlistToggle, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct WishlistEntryRow {
    id: WishlistItemId,
    product_id: ProductId,
    created_at: DateTime<Utc>,
    product_name: String,
    product_price: Decimal,
    product_image_url: Option<String>,
}

impl From<WishlistEntryRow> for WishlistEntry {
    fn from(row: WishlistEntryRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            product: ProductSummary {
                id: row.product_id,
                name: row.product_name,
                price: row.product_price,
                image_url: row.product_image_url,
            },
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl WishlistStore for PgStore {
    async fn list_wishlist(&self, user_id: UserId) -> Result<Vec<WishlistEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, WishlistEntryRow>(
            r"
            SELECT w.id, w.product_id, w.created_at,
                   p.name AS product_name, p.price AS product_price,
                   p.image_url AS product_image_url
            FROM wishlist_item w
            JOIN product p ON p.id = w.product_id
            WHERE w.user_id = $1
            ORDER BY w.created_at DESC, w.id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(WishlistEntry::from).collect())
    }

    async fn toggle_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<WishlistToggle, RepositoryError> {
        let mut tx = self.pool().begin().await?;

        let removed = sqlx::query_scalar::<_, WishlistItemId>(
            "DELETE FROM wishlist_item WHERE user_id = $1 AND product_id = $2 RETURNING id",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        if removed.is_some() {
            tx.commit().await?;
            return Ok(WishlistToggle::Removed);
        }

        // A concurrent toggle may have inserted the row first; either way it
        // exists afterwards.
        sqlx::query(
            r"
            INSERT INTO wishlist_item (user_id, product_id)
            VALUES ($1, $2)
            ON CONFLICT ON CONSTRAINT wishlist_item_user_product_key DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        let entry = sqlx::query_as::<_, WishlistEntryRow>(
            r"
            SELECT w.id, w.product_id, w.created_at,
                   p.name AS product_name, p.price AS product_price,
                   p.image_url AS product_image_url
            FROM wishlist_item w
            JOIN product p ON p.id = w.product_id
            WHERE w.user_id = $1 AND w.product_id = $2
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(WishlistToggle::Added(entry.into()))
    }
}
