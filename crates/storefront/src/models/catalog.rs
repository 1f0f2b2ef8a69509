//! Catalog domain types: products and collections.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{CollectionId, ProductId};

use super::nullable;

/// A product in the catalog.
///
/// `stock` is informational only: nothing reserves or decrements it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub collection_id: Option<CollectionId>,
    /// Sizes a cart line may pick from. Empty means the product is unsized.
    pub sizes: Vec<String>,
    /// Primary image.
    pub image_url: Option<String>,
    /// Additional gallery images.
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The writable fields of this product.
    #[must_use]
    pub fn fields(&self) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
            stock: self.stock,
            collection_id: self.collection_id,
            sizes: self.sizes.clone(),
            image_url: self.image_url.clone(),
            images: self.images.clone(),
        }
    }

    /// The subset of product fields embedded in cart, wishlist and order lines.
    #[must_use]
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            image_url: self.image_url.clone(),
        }
    }
}

/// Validated, writable product fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFields {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub collection_id: Option<CollectionId>,
    pub sizes: Vec<String>,
    pub image_url: Option<String>,
    pub images: Vec<String>,
}

/// Product fields embedded in cart and wishlist responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
}

/// A named grouping of products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    /// The writable fields of this collection.
    #[must_use]
    pub fn fields(&self) -> CollectionFields {
        CollectionFields {
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// Validated, writable collection fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFields {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// A collection with its products embedded, as served by `GET /collections/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionWithProducts {
    #[serde(flatten)]
    pub collection: Collection,
    pub products: Vec<Product>,
}

/// Body of `POST /admin/products`. Validated by the catalog service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub collection_id: Option<CollectionId>,
    #[serde(default)]
    pub sizes: Vec<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Body of `PUT /admin/products/{id}`. Absent fields are left unchanged;
/// `collection_id` and `image_url` may be cleared with `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub collection_id: Option<Option<CollectionId>>,
    pub sizes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub images: Option<Vec<String>>,
}

/// Body of `POST /admin/collections`.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Body of `PUT /admin/collections/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
}
