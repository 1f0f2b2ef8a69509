//! Server-side cart types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{CartItemId, ProductId, UserId};

use super::ProductSummary;

/// A stored cart row. `(user_id, product_id, size)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub size: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart row enriched with display fields of its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub size: Option<String>,
    pub product: ProductSummary,
    /// `product.price * quantity` at read time.
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Join a cart row with its product.
    #[must_use]
    pub fn new(item: CartItem, product: ProductSummary) -> Self {
        let line_total = product.price * Decimal::from(item.quantity);
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            size: item.size,
            product,
            line_total,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

/// The caller's cart as served by `GET /cart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    pub items: Vec<CartLine>,
    /// Total number of units across all lines.
    pub item_count: i64,
    pub subtotal: Decimal,
}

impl Cart {
    /// Build a cart from its lines, computing the totals.
    #[must_use]
    pub fn from_lines(items: Vec<CartLine>) -> Self {
        let item_count = items.iter().map(|line| i64::from(line.quantity)).sum();
        let subtotal = items.iter().map(|line| line.line_total).sum();
        Self {
            items,
            item_count,
            subtotal,
        }
    }
}

/// One entry of `POST /cart` or of the guest list in `POST /cart/sync`.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItemInput {
    pub product_id: ProductId,
    pub quantity: Option<i32>,
    pub size: Option<String>,
}

/// Body of `POST /cart/sync`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncCartInput {
    #[serde(default)]
    pub items: Vec<CartItemInput>,
}

/// Body of `PUT /cart/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCartInput {
    pub quantity: Option<i32>,
}

/// Result of a direct add.
#[derive(Debug, Clone)]
pub struct AddToCart {
    pub line: CartLine,
    /// `true` when a new row was inserted, `false` when an existing row was
    /// incremented.
    pub created: bool,
}

/// A guest cart entry that could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRejection {
    /// Position of the entry in the submitted list.
    pub index: usize,
    pub product_id: ProductId,
    pub reason: String,
}

/// Result of merging a guest cart.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub cart: Cart,
    pub rejected: Vec<SyncRejection>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;

    use super::*;

    fn line(quantity: i32, price: &str) -> CartLine {
        let now = Utc::now();
        CartLine::new(
            CartItem {
                id: CartItemId::new(1),
                user_id: UserId::new(1),
                product_id: ProductId::new(1),
                quantity,
                size: None,
                created_at: now,
                updated_at: now,
            },
            ProductSummary {
                id: ProductId::new(1),
                name: "Linen Shirt".to_owned(),
                price: Decimal::from_str(price).unwrap(),
                image_url: None,
            },
        )
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line(3, "19.99").line_total, Decimal::from_str("59.97").unwrap());
    }

    #[test]
    fn test_cart_totals() {
        let cart = Cart::from_lines(vec![line(2, "10.00"), line(1, "5.50")]);
        assert_eq!(cart.item_count, 3);
        assert_eq!(cart.subtotal, Decimal::from_str("25.50").unwrap());
    }

    #[test]
    fn test_empty_cart_totals() {
        let cart = Cart::from_lines(Vec::new());
        assert_eq!(cart.item_count, 0);
        assert_eq!(cart.subtotal, Decimal::ZERO);
    }

    #[test]
    fn test_sync_outcome_nests_the_cart() {
        let outcome = SyncOutcome {
            cart: Cart::from_lines(vec![line(2, "10.00")]),
            rejected: vec![SyncRejection {
                index: 1,
                product_id: ProductId::new(9),
                reason: "product not found".to_owned(),
            }],
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["cart"]["items"].as_array().unwrap().len(), 1);
        assert_eq!(json["cart"]["item_count"], 2);
        assert!(json["cart"]["subtotal"].is_string());
        assert!(json.get("items").is_none());
        assert_eq!(json["rejected"][0]["index"], 1);
    }
}
