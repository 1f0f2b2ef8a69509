//! Catalog service: cached reads and validated admin writes.
//!
//! Reads go through the [`ResponseCache`]. Every write invalidates the tags
//! of the data it touched, including collection pages that embed a product.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, instrument};

use atelier_core::{CollectionId, ProductId, to_minor_units};

use crate::cache::{CacheKey, CacheTag, ResponseCache};
use crate::db::{RepositoryError, Store};
use crate::models::{
    Collection, CollectionFields, CollectionInput, CollectionPatch, CollectionWithProducts,
    Product, ProductFields, ProductInput, ProductPatch,
};
use crate::services::FieldErrors;

const MAX_NAME_LENGTH: usize = 255;
const MAX_DESCRIPTION_LENGTH: usize = 10_000;
const MAX_URL_LENGTH: usize = 2048;
const MAX_SIZE_LENGTH: usize = 50;

/// Errors that can occur in catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("collection {0} not found")]
    CollectionNotFound(CollectionId),

    /// Another collection already uses this slug.
    #[error("slug already exists")]
    SlugTaken,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<FieldErrors> for CatalogError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Products and collections.
pub struct CatalogService<'a> {
    store: &'a dyn Store,
    cache: &'a ResponseCache,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, cache: &'a ResponseCache) -> Self {
        Self { store, cache }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the store fails.
    pub async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        self.cache
            .get_or_load(CacheKey::Products, || async {
                Ok::<_, CatalogError>(self.store.list_products().await?)
            })
            .await
    }

    /// One product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ProductNotFound` if it does not exist.
    pub async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.cache
            .get_or_load(CacheKey::Product(id), || async {
                self.store
                    .get_product(id)
                    .await?
                    .ok_or(CatalogError::ProductNotFound(id))
            })
            .await
    }

    /// All collections, without their products.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the store fails.
    pub async fn list_collections(&self) -> Result<Vec<Collection>, CatalogError> {
        self.cache
            .get_or_load(CacheKey::Collections, || async {
                Ok::<_, CatalogError>(self.store.list_collections().await?)
            })
            .await
    }

    /// One collection with its products embedded.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::CollectionNotFound` if it does not exist.
    pub async fn get_collection(
        &self,
        id: CollectionId,
    ) -> Result<CollectionWithProducts, CatalogError> {
        self.cache
            .get_or_load(CacheKey::Collection(id), || async {
                let collection = self
                    .store
                    .get_collection(id)
                    .await?
                    .ok_or(CatalogError::CollectionNotFound(id))?;
                let products = self.store.list_collection_products(id).await?;
                Ok::<_, CatalogError>(CollectionWithProducts {
                    collection,
                    products,
                })
            })
            .await
    }

    // =========================================================================
    // Product writes
    // =========================================================================

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` if a field is missing or invalid,
    /// including a `collection_id` that does not exist.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product, CatalogError> {
        let mut errors = FieldErrors::new();
        if input.price.is_none() {
            errors.add("price", "is required");
        }
        if input.stock.is_none() {
            errors.add("stock", "is required");
        }

        let mut fields = ProductFields {
            name: input.name.clone(),
            description: input.description.clone(),
            price: input.price.unwrap_or(Decimal::ZERO),
            stock: input.stock.unwrap_or(0),
            collection_id: input.collection_id,
            sizes: input.sizes.clone(),
            image_url: input.image_url.clone(),
            images: input.images.clone(),
        };
        self.check_product(&mut errors, &mut fields).await?;
        errors.into_result()?;

        let product = self
            .store
            .create_product(&fields)
            .await
            .map_err(unknown_collection)?;

        info!(product_id = %product.id, "Product created");
        self.cache.invalidate(&product_tags(&product, None));
        Ok(product)
    }

    /// Apply a partial update to a product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ProductNotFound` if it does not exist.
    /// Returns `CatalogError::Validation` if the merged product is invalid.
    #[instrument(skip(self, patch), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, CatalogError> {
        let existing = self
            .store
            .get_product(id)
            .await?
            .ok_or(CatalogError::ProductNotFound(id))?;

        let mut fields = existing.fields();
        if let Some(name) = &patch.name {
            fields.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            fields.description.clone_from(description);
        }
        if let Some(price) = patch.price {
            fields.price = price;
        }
        if let Some(stock) = patch.stock {
            fields.stock = stock;
        }
        if let Some(collection_id) = patch.collection_id {
            fields.collection_id = collection_id;
        }
        if let Some(sizes) = &patch.sizes {
            fields.sizes.clone_from(sizes);
        }
        if let Some(image_url) = &patch.image_url {
            fields.image_url.clone_from(image_url);
        }
        if let Some(images) = &patch.images {
            fields.images.clone_from(images);
        }

        let mut errors = FieldErrors::new();
        self.check_product(&mut errors, &mut fields).await?;
        errors.into_result()?;

        let product = self
            .store
            .update_product(id, &fields)
            .await
            .map_err(unknown_collection)?
            .ok_or(CatalogError::ProductNotFound(id))?;

        info!("Product updated");
        self.cache
            .invalidate(&product_tags(&product, existing.collection_id));
        Ok(product)
    }

    /// Delete a product. Cart and wishlist rows for it go with it; order
    /// lines keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ProductNotFound` if it does not exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), CatalogError> {
        let existing = self
            .store
            .get_product(id)
            .await?
            .ok_or(CatalogError::ProductNotFound(id))?;

        if !self.store.delete_product(id).await? {
            return Err(CatalogError::ProductNotFound(id));
        }

        info!("Product deleted");
        self.cache.invalidate(&product_tags(&existing, None));
        Ok(())
    }

    /// Normalize product fields in place, recording problems in `errors`.
    async fn check_product(
        &self,
        errors: &mut FieldErrors,
        fields: &mut ProductFields,
    ) -> Result<(), CatalogError> {
        fields.name = errors.required_text("name", Some(&fields.name), MAX_NAME_LENGTH);
        fields.description =
            errors.required_text("description", Some(&fields.description), MAX_DESCRIPTION_LENGTH);

        if let Err(e) = to_minor_units(fields.price) {
            errors.add("price", e.to_string());
        }
        if fields.stock < 0 {
            errors.add("stock", "cannot be negative");
        }

        let mut sizes: Vec<String> = Vec::with_capacity(fields.sizes.len());
        for size in &fields.sizes {
            let size = size.trim();
            if size.is_empty() {
                continue;
            }
            if size.chars().count() > MAX_SIZE_LENGTH {
                errors.add("sizes", format!("must be at most {MAX_SIZE_LENGTH} characters each"));
            } else if !sizes.iter().any(|s| s == size) {
                sizes.push(size.to_owned());
            }
        }
        fields.sizes = sizes;

        fields.image_url = errors.optional_text("image_url", fields.image_url.as_deref(), MAX_URL_LENGTH);
        let mut images = Vec::with_capacity(fields.images.len());
        for image in &fields.images {
            if let Some(image) = errors.optional_text("images", Some(image), MAX_URL_LENGTH) {
                images.push(image);
            }
        }
        fields.images = images;

        if let Some(collection_id) = fields.collection_id
            && self.store.get_collection(collection_id).await?.is_none()
        {
            errors.add("collection_id", "collection does not exist");
        }

        Ok(())
    }

    // =========================================================================
    // Collection writes
    // =========================================================================

    /// Create a collection.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` if a field is missing or invalid.
    /// Returns `CatalogError::SlugTaken` if the slug is in use.
    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_collection(
        &self,
        input: &CollectionInput,
    ) -> Result<Collection, CatalogError> {
        let fields = check_collection(CollectionFields {
            name: input.name.clone(),
            slug: input.slug.clone(),
            description: input.description.clone(),
            image_url: input.image_url.clone(),
        })?;

        let collection = self
            .store
            .create_collection(&fields)
            .await
            .map_err(slug_conflict)?;

        info!(collection_id = %collection.id, "Collection created");
        self.cache.invalidate(&[
            CacheTag::CollectionList,
            CacheTag::Collection(collection.id),
        ]);
        Ok(collection)
    }

    /// Apply a partial update to a collection.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::CollectionNotFound` if it does not exist.
    /// Returns `CatalogError::SlugTaken` if the new slug is in use.
    #[instrument(skip(self, patch), fields(collection_id = %id))]
    pub async fn update_collection(
        &self,
        id: CollectionId,
        patch: &CollectionPatch,
    ) -> Result<Collection, CatalogError> {
        let existing = self
            .store
            .get_collection(id)
            .await?
            .ok_or(CatalogError::CollectionNotFound(id))?;

        let mut fields = existing.fields();
        if let Some(name) = &patch.name {
            fields.name.clone_from(name);
        }
        if let Some(slug) = &patch.slug {
            fields.slug.clone_from(slug);
        }
        if let Some(description) = &patch.description {
            fields.description.clone_from(description);
        }
        if let Some(image_url) = &patch.image_url {
            fields.image_url.clone_from(image_url);
        }
        let fields = check_collection(fields)?;

        let collection = self
            .store
            .update_collection(id, &fields)
            .await
            .map_err(slug_conflict)?
            .ok_or(CatalogError::CollectionNotFound(id))?;

        info!("Collection updated");
        self.cache
            .invalidate(&[CacheTag::CollectionList, CacheTag::Collection(id)]);
        Ok(collection)
    }

    /// Delete a collection. Its products stay in the catalog without one.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::CollectionNotFound` if it does not exist.
    #[instrument(skip(self), fields(collection_id = %id))]
    pub async fn delete_collection(&self, id: CollectionId) -> Result<(), CatalogError> {
        let products = self.store.list_collection_products(id).await?;

        if !self.store.delete_collection(id).await? {
            return Err(CatalogError::CollectionNotFound(id));
        }

        info!(detached_products = products.len(), "Collection deleted");
        let mut tags = vec![
            CacheTag::CollectionList,
            CacheTag::Collection(id),
            CacheTag::ProductList,
        ];
        tags.extend(products.iter().map(|p| CacheTag::Product(p.id)));
        self.cache.invalidate(&tags);
        Ok(())
    }
}

/// Tags to evict after a product write. `previous_collection` is the
/// collection the product belonged to before the write, if it changed.
fn product_tags(product: &Product, previous_collection: Option<CollectionId>) -> Vec<CacheTag> {
    let mut tags = vec![CacheTag::ProductList, CacheTag::Product(product.id)];
    tags.extend(
        product
            .collection_id
            .into_iter()
            .chain(previous_collection)
            .map(CacheTag::Collection),
    );
    tags
}

/// Trim and validate collection fields.
fn check_collection(mut fields: CollectionFields) -> Result<CollectionFields, FieldErrors> {
    let mut errors = FieldErrors::new();
    fields.name = errors.required_text("name", Some(&fields.name), MAX_NAME_LENGTH);

    fields.slug = fields.slug.trim().to_lowercase();
    if fields.slug.is_empty() {
        errors.add("slug", "is required");
    } else if fields.slug.len() > MAX_NAME_LENGTH {
        errors.add("slug", format!("must be at most {MAX_NAME_LENGTH} characters"));
    } else if !is_valid_slug(&fields.slug) {
        errors.add(
            "slug",
            "may only contain lowercase letters, digits and hyphens",
        );
    }

    fields.description =
        errors.optional_text("description", fields.description.as_deref(), MAX_DESCRIPTION_LENGTH);
    fields.image_url = errors.optional_text("image_url", fields.image_url.as_deref(), MAX_URL_LENGTH);

    errors.into_result()?;
    Ok(fields)
}

/// Whether `slug` is made of `[a-z0-9-]` only.
fn is_valid_slug(slug: &str) -> bool {
    slug.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// The store reports a missing collection as a conflict; callers see a field error.
fn unknown_collection(e: RepositoryError) -> CatalogError {
    match e {
        RepositoryError::Conflict(_) => {
            CatalogError::Validation(FieldErrors::single("collection_id", "collection does not exist"))
        }
        other => CatalogError::Repository(other),
    }
}

fn slug_conflict(e: RepositoryError) -> CatalogError {
    match e {
        RepositoryError::Conflict(_) => CatalogError::SlugTaken,
        other => CatalogError::Repository(other),
    }
}
