//! Wishlist types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{ProductId, WishlistItemId};

use super::ProductSummary;

/// A wishlist row enriched with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WishlistEntry {
    pub id: WishlistItemId,
    pub product_id: ProductId,
    pub product: ProductSummary,
    pub created_at: DateTime<Utc>,
}

/// What a toggle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishlistToggle {
    Added(WishlistEntry),
    Removed,
}

/// Body of `POST /wishlist/toggle`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleWishlistInput {
    pub product_id: ProductId,
}
