//! Wishlist service.

use thiserror::Error;
use tracing::{debug, instrument};

use atelier_core::{ProductId, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::{WishlistEntry, WishlistToggle};

/// Errors that can occur in wishlist operations.
#[derive(Debug, Error)]
pub enum WishlistError {
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for WishlistError {
    fn from(e: RepositoryError) -> Self {
        Self::Repository(e)
    }
}

/// The caller's wishlist.
pub struct WishlistService<'a> {
    store: &'a dyn Store,
}

impl<'a> WishlistService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Wishlisted products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::Repository` if the store fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<WishlistEntry>, WishlistError> {
        Ok(self.store.list_wishlist(user_id).await?)
    }

    /// Add the product if absent, remove it if present.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::ProductNotFound` if the product does not exist.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn toggle(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<WishlistToggle, WishlistError> {
        let toggled = self
            .store
            .toggle_wishlist(user_id, product_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => WishlistError::ProductNotFound(product_id),
                other => WishlistError::Repository(other),
            })?;

        debug!(added = matches!(toggled, WishlistToggle::Added(_)), "Wishlist toggled");
        Ok(toggled)
    }
}
