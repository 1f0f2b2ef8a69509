//! Product and collection persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use atelier_core::{CollectionId, ProductId};

use super::{PgStore, RepositoryError};
use crate::models::{Collection, CollectionFields, Product, ProductFields};

/// The product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All products, oldest first.
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    /// Get a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Get every product whose ID is in `ids`. Unknown IDs are skipped.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Insert a product.
    async fn create_product(&self, fields: &ProductFields) -> Result<Product, RepositoryError>;

    /// Overwrite a product's fields. Returns `None` if it does not exist.
    async fn update_product(
        &self,
        id: ProductId,
        fields: &ProductFields,
    ) -> Result<Option<Product>, RepositoryError>;

    /// Delete a product. Returns whether it existed.
    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// All collections, oldest first.
    async fn list_collections(&self) -> Result<Vec<Collection>, RepositoryError>;

    /// Get a collection by ID.
    async fn get_collection(&self, id: CollectionId)
    -> Result<Option<Collection>, RepositoryError>;

    /// Products assigned to a collection.
    async fn list_collection_products(
        &self,
        id: CollectionId,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Insert a collection.
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    async fn create_collection(
        &self,
        fields: &CollectionFields,
    ) -> Result<Collection, RepositoryError>;

    /// Overwrite a collection's fields. Returns `None` if it does not exist.
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    async fn update_collection(
        &self,
        id: CollectionId,
        fields: &CollectionFields,
    ) -> Result<Option<Collection>, RepositoryError>;

    /// Delete a collection; its products keep existing without one.
    /// Returns whether it existed.
    async fn delete_collection(&self, id: CollectionId) -> Result<bool, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price: Decimal,
    stock: i32,
    collection_id: Option<CollectionId>,
    sizes: Vec<String>,
    image_url: Option<String>,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            stock: row.stock,
            collection_id: row.collection_id,
            sizes: row.sizes,
            image_url: row.image_url,
            images: row.images,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: CollectionId,
    name: String,
    slug: String,
    description: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CollectionRow> for Collection {
    fn from(row: CollectionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn map_product_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::Conflict("collection does not exist".to_owned());
    }
    RepositoryError::Database(e)
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, stock, collection_id, sizes,
                   image_url, images, created_at, updated_at
            FROM product
            ORDER BY id
            ",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, stock, collection_id, sizes,
                   image_url, images, created_at, updated_at
            FROM product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Product::from))
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, stock, collection_id, sizes,
                   image_url, images, created_at, updated_at
            FROM product
            WHERE id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create_product(&self, fields: &ProductFields) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO product
                (name, description, price, stock, collection_id, sizes, image_url, images)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, name, description, price, stock, collection_id, sizes,
                      image_url, images, created_at, updated_at
            ",
        )
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.price)
        .bind(fields.stock)
        .bind(fields.collection_id)
        .bind(&fields.sizes)
        .bind(fields.image_url.as_deref())
        .bind(&fields.images)
        .fetch_one(self.pool())
        .await
        .map_err(map_product_write_error)?;

        Ok(row.into())
    }

    async fn update_product(
        &self,
        id: ProductId,
        fields: &ProductFields,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            UPDATE product
            SET name = $2, description = $3, price = $4, stock = $5, collection_id = $6,
                sizes = $7, image_url = $8, images = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, price, stock, collection_id, sizes,
                      image_url, images, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.price)
        .bind(fields.stock)
        .bind(fields.collection_id)
        .bind(&fields.sizes)
        .bind(fields.image_url.as_deref())
        .bind(&fields.images)
        .fetch_optional(self.pool())
        .await
        .map_err(map_product_write_error)?;

        Ok(row.map(Product::from))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, RepositoryError> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            r"
            SELECT id, name, slug, description, image_url, created_at, updated_at
            FROM collection
            ORDER BY id
            ",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Collection::from).collect())
    }

    async fn get_collection(
        &self,
        id: CollectionId,
    ) -> Result<Option<Collection>, RepositoryError> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r"
            SELECT id, name, slug, description, image_url, created_at, updated_at
            FROM collection
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Collection::from))
    }

    async fn list_collection_products(
        &self,
        id: CollectionId,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, stock, collection_id, sizes,
                   image_url, images, created_at, updated_at
            FROM product
            WHERE collection_id = $1
            ORDER BY id
            ",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create_collection(
        &self,
        fields: &CollectionFields,
    ) -> Result<Collection, RepositoryError> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r"
            INSERT INTO collection (name, slug, description, image_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, slug, description, image_url, created_at, updated_at
            ",
        )
        .bind(&fields.name)
        .bind(&fields.slug)
        .bind(fields.description.as_deref())
        .bind(fields.image_url.as_deref())
        .fetch_one(self.pool())
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "slug already exists"))?;

        Ok(row.into())
    }

    async fn update_collection(
        &self,
        id: CollectionId,
        fields: &CollectionFields,
    ) -> Result<Option<Collection>, RepositoryError> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r"
            UPDATE collection
            SET name = $2, slug = $3, description = $4, image_url = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, slug, description, image_url, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.slug)
        .bind(fields.description.as_deref())
        .bind(fields.image_url.as_deref())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "slug already exists"))?;

        Ok(row.map(Collection::from))
    }

    async fn delete_collection(&self, id: CollectionId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM collection WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
