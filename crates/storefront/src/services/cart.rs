//! Server-side cart and guest cart reconciliation.
//!
//! Adding a `(product, size)` the cart already holds adds to that row's
//! quantity, capped at the configured per-line maximum. The same rule merges
//! a guest cart into the server cart at login.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, instrument, warn};

use atelier_core::{CartItemId, ProductId, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::cart::{SyncCartInput, UpdateCartInput};
use crate::models::{AddToCart, Cart, CartItemInput, CartLine, Product, SyncOutcome, SyncRejection};
use crate::services::FieldErrors;

/// Errors that can occur in cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The cart row does not exist or belongs to another user.
    #[error("cart item not found")]
    ItemNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<FieldErrors> for CartError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

/// The caller's server-side cart.
pub struct CartService<'a> {
    store: &'a dyn Store,
    max_line_quantity: i32,
}

impl<'a> CartService<'a> {
    /// `max_line_quantity` caps the quantity of any single cart row.
    #[must_use]
    pub const fn new(store: &'a dyn Store, max_line_quantity: i32) -> Self {
        Self {
            store,
            max_line_quantity,
        }
    }

    /// The user's cart with product details and totals.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn list(&self, user_id: UserId) -> Result<Cart, CartError> {
        let lines = self.store.list_cart(user_id).await?;
        Ok(Cart::from_lines(lines))
    }

    /// Add a product to the cart, incrementing an existing row for the same
    /// `(product, size)`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductNotFound` if the product does not exist.
    /// Returns `CartError::Validation` if the quantity or size is invalid.
    #[instrument(skip(self, input), fields(user_id = %user_id, product_id = %input.product_id))]
    pub async fn add(&self, user_id: UserId, input: &CartItemInput) -> Result<AddToCart, CartError> {
        let product = self
            .store
            .get_product(input.product_id)
            .await?
            .ok_or(CartError::ProductNotFound(input.product_id))?;

        let (line, created) = self.merge(user_id, &product, input).await?;
        Ok(AddToCart { line, created })
    }

    /// Set the quantity of one of the user's cart rows.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` if the quantity is missing, below 1 or
    /// above the per-line maximum.
    /// Returns `CartError::ItemNotFound` if the row is not the user's.
    #[instrument(skip(self, input), fields(user_id = %user_id, cart_item_id = %id))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        input: &UpdateCartInput,
    ) -> Result<CartLine, CartError> {
        let quantity = match input.quantity {
            None => return Err(FieldErrors::single("quantity", "is required").into()),
            Some(q) if q < 1 => {
                return Err(FieldErrors::single("quantity", "must be at least 1").into());
            }
            Some(q) if q > self.max_line_quantity => {
                return Err(FieldErrors::single(
                    "quantity",
                    format!("must be at most {}", self.max_line_quantity),
                )
                .into());
            }
            Some(q) => q,
        };

        let item = self
            .store
            .set_cart_quantity(user_id, id, quantity)
            .await?
            .ok_or(CartError::ItemNotFound)?;

        let product = self
            .store
            .get_product(item.product_id)
            .await?
            .ok_or(CartError::ItemNotFound)?;

        Ok(CartLine::new(item, product.summary()))
    }

    /// Remove one of the user's cart rows. Removing a row that is not there
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    #[instrument(skip(self), fields(user_id = %user_id, cart_item_id = %id))]
    pub async fn remove(&self, user_id: UserId, id: CartItemId) -> Result<(), CartError> {
        self.store.remove_cart_item(user_id, id).await?;
        Ok(())
    }

    /// Merge a guest cart into the user's server cart.
    ///
    /// Each entry is merged on its own: one bad entry is reported in
    /// `rejected` and does not stop the rest.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` only if the products or the final cart
    /// cannot be read.
    #[instrument(skip(self, input), fields(user_id = %user_id, entries = input.items.len()))]
    pub async fn sync(&self, user_id: UserId, input: &SyncCartInput) -> Result<SyncOutcome, CartError> {
        let mut ids: Vec<ProductId> = input.items.iter().map(|item| item.product_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let products: HashMap<ProductId, Product> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut rejected = Vec::new();
        for (index, entry) in input.items.iter().enumerate() {
            let result = match products.get(&entry.product_id) {
                Some(product) => self.merge(user_id, product, entry).await.map(|_| ()),
                None => Err(CartError::ProductNotFound(entry.product_id)),
            };

            if let Err(e) = result {
                if let CartError::Repository(ref source) = e {
                    warn!(index, product_id = %entry.product_id, error = %source, "Guest cart entry not merged");
                }
                rejected.push(SyncRejection {
                    index,
                    product_id: entry.product_id,
                    reason: rejection_reason(&e),
                });
            }
        }

        info!(
            merged = input.items.len() - rejected.len(),
            rejected = rejected.len(),
            "Guest cart merged"
        );

        Ok(SyncOutcome {
            cart: self.list(user_id).await?,
            rejected,
        })
    }

    /// Validate one entry against its product and upsert it.
    async fn merge(
        &self,
        user_id: UserId,
        product: &Product,
        input: &CartItemInput,
    ) -> Result<(CartLine, bool), CartError> {
        let mut errors = FieldErrors::new();

        let quantity = input.quantity.unwrap_or(1);
        if quantity < 1 {
            errors.add("quantity", "must be at least 1");
        }
        let size = match resolve_size(product, input.size.as_deref()) {
            Ok(size) => size,
            Err(message) => {
                errors.add("size", message);
                None
            }
        };
        errors.into_result()?;

        let (item, created) = self
            .store
            .add_to_cart(
                user_id,
                product.id,
                size.as_deref(),
                quantity.min(self.max_line_quantity),
                self.max_line_quantity,
            )
            .await?;

        Ok((CartLine::new(item, product.summary()), created))
    }
}

/// Normalize a submitted size against the sizes the product offers.
fn resolve_size(product: &Product, size: Option<&str>) -> Result<Option<String>, String> {
    let size = size.map(str::trim).filter(|s| !s.is_empty());

    match size {
        None if product.sizes.is_empty() => Ok(None),
        None => Err("is required for this product".to_owned()),
        Some(_) if product.sizes.is_empty() => Err("this product has no sizes".to_owned()),
        Some(size) if product.sizes.iter().any(|s| s == size) => Ok(Some(size.to_owned())),
        Some(_) => Err(format!("must be one of: {}", product.sizes.join(", "))),
    }
}

/// Client-facing reason for a rejected guest cart entry.
fn rejection_reason(error: &CartError) -> String {
    match error {
        CartError::Validation(fields) => fields.to_string(),
        CartError::ProductNotFound(_) => "product not found".to_owned(),
        CartError::ItemNotFound | CartError::Repository(_) => "could not be added".to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::db::{CatalogStore, MemoryStore, UserStore};
    use crate::models::{NewUser, ProductFields};

    async fn setup(store: &MemoryStore, sizes: &[&str]) -> (UserId, ProductId) {
        let user = store
            .create_user(&NewUser {
                name: "Ada".to_owned(),
                email: atelier_core::Email::parse("ada@example.com").unwrap(),
                password_hash: "x".to_owned(),
            })
            .await
            .unwrap();
        let product = store
            .create_product(&ProductFields {
                name: "Linen Shirt".to_owned(),
                description: "Shirt".to_owned(),
                price: Decimal::from_str("20.00").unwrap(),
                stock: 5,
                collection_id: None,
                sizes: sizes.iter().map(|s| (*s).to_owned()).collect(),
                image_url: None,
                images: Vec::new(),
            })
            .await
            .unwrap();
        (user.id, product.id)
    }

    fn entry(product_id: ProductId, quantity: i32, size: Option<&str>) -> CartItemInput {
        CartItemInput {
            product_id,
            quantity: Some(quantity),
            size: size.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn test_add_then_add_again_increments() {
        let store = MemoryStore::new();
        let (user, product) = setup(&store, &["S", "M"]).await;
        let cart = CartService::new(&store, 99);

        let first = cart.add(user, &entry(product, 1, Some("M"))).await.unwrap();
        let second = cart.add(user, &entry(product, 2, Some(" M "))).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.line.id, first.line.id);
        assert_eq!(second.line.quantity, 3);
        assert_eq!(second.line.line_total, Decimal::from_str("60.00").unwrap());
        assert_eq!(store.cart_items(user).len(), 1);
    }

    #[tokio::test]
    async fn test_different_sizes_are_different_rows() {
        let store = MemoryStore::new();
        let (user, product) = setup(&store, &["S", "M"]).await;
        let cart = CartService::new(&store, 99);

        cart.add(user, &entry(product, 1, Some("S"))).await.unwrap();
        cart.add(user, &entry(product, 1, Some("M"))).await.unwrap();

        let listed = cart.list(user).await.unwrap();
        assert_eq!(listed.items.len(), 2);
        assert_eq!(listed.item_count, 2);
    }

    #[tokio::test]
    async fn test_size_rules() {
        let store = MemoryStore::new();
        let (user, sized) = setup(&store, &["S", "M"]).await;
        let cart = CartService::new(&store, 99);

        for size in [None, Some("XL")] {
            assert!(matches!(
                cart.add(user, &entry(sized, 1, size)).await,
                Err(CartError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unsized_product_rejects_size() {
        let store = MemoryStore::new();
        let (user, plain) = setup(&store, &[]).await;
        let cart = CartService::new(&store, 99);

        assert!(matches!(
            cart.add(user, &entry(plain, 1, Some("M"))).await,
            Err(CartError::Validation(_))
        ));
        assert!(cart.add(user, &entry(plain, 1, Some("  "))).await.is_ok());
    }

    #[tokio::test]
    async fn test_quantity_is_capped() {
        let store = MemoryStore::new();
        let (user, product) = setup(&store, &[]).await;
        let cart = CartService::new(&store, 10);

        cart.add(user, &entry(product, 7, None)).await.unwrap();
        let capped = cart.add(user, &entry(product, 7, None)).await.unwrap();
        assert_eq!(capped.line.quantity, 10);

        let line_id = capped.line.id;
        let too_many = cart
            .update_quantity(user, line_id, &UpdateCartInput { quantity: Some(11) })
            .await;
        assert!(matches!(too_many, Err(CartError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_remove_are_owner_scoped() {
        let store = MemoryStore::new();
        let (user, product) = setup(&store, &[]).await;
        let other = store
            .create_user(&NewUser {
                name: "Bob".to_owned(),
                email: atelier_core::Email::parse("bob@example.com").unwrap(),
                password_hash: "x".to_owned(),
            })
            .await
            .unwrap()
            .id;
        let cart = CartService::new(&store, 99);
        let added = cart.add(user, &entry(product, 1, None)).await.unwrap();

        let stolen = cart
            .update_quantity(other, added.line.id, &UpdateCartInput { quantity: Some(5) })
            .await;
        assert!(matches!(stolen, Err(CartError::ItemNotFound)));

        cart.remove(other, added.line.id).await.unwrap();
        assert_eq!(store.cart_items(user).len(), 1);

        cart.remove(user, added.line.id).await.unwrap();
        cart.remove(user, added.line.id).await.unwrap();
        assert!(store.cart_items(user).is_empty());
    }

    #[tokio::test]
    async fn test_sync_reports_bad_entries_and_keeps_going() {
        let store = MemoryStore::new();
        let (user, product) = setup(&store, &["M"]).await;
        let cart = CartService::new(&store, 99);

        let outcome = cart
            .sync(
                user,
                &SyncCartInput {
                    items: vec![
                        entry(ProductId::new(999), 1, None),
                        entry(product, 0, Some("M")),
                        entry(product, 2, Some("M")),
                    ],
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].index, 0);
        assert_eq!(outcome.rejected[0].reason, "product not found");
        assert_eq!(outcome.rejected[1].index, 1);
        assert_eq!(outcome.cart.items.len(), 1);
        assert_eq!(outcome.cart.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_sync_store_failure_is_isolated() {
        let store = MemoryStore::new();
        let (user, product) = setup(&store, &[]).await;
        let second = store
            .create_product(&ProductFields {
                name: "Belt".to_owned(),
                description: "Leather belt".to_owned(),
                price: Decimal::from_str("15.00").unwrap(),
                stock: 1,
                collection_id: None,
                sizes: Vec::new(),
                image_url: None,
                images: Vec::new(),
            })
            .await
            .unwrap()
            .id;
        store.fail_cart_adds_for(product);
        let cart = CartService::new(&store, 99);

        let outcome = cart
            .sync(
                user,
                &SyncCartInput {
                    items: vec![entry(product, 1, None), entry(second, 1, None)],
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason, "could not be added");
        assert_eq!(outcome.cart.items.len(), 1);
        assert_eq!(outcome.cart.items[0].product_id, second);
    }

    #[test]
    fn test_resolve_size_trims() {
        let now = chrono::Utc::now();
        let product = Product {
            id: ProductId::new(1),
            name: "Shirt".to_owned(),
            description: String::new(),
            price: Decimal::ONE,
            stock: 0,
            collection_id: None,
            sizes: vec!["M".to_owned()],
            image_url: None,
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(resolve_size(&product, Some(" M ")), Ok(Some("M".to_owned())));
        assert!(resolve_size(&product, Some("m")).is_err());
    }
}
