//! Domain models for the storefront.
//!
//! These types represent validated domain objects separate from database row
//! types. Request payloads (`*Input`) live next to the entity they create or
//! modify.

pub mod address;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod session;
pub mod user;
pub mod wishlist;

pub use address::{Address, AddressFields, CreateAddressInput, UpdateAddressInput};
pub use cart::{AddToCart, Cart, CartItem, CartItemInput, CartLine, SyncOutcome, SyncRejection};
pub use catalog::{
    Collection, CollectionFields, CollectionInput, CollectionPatch, CollectionWithProducts,
    Product, ProductFields, ProductInput, ProductPatch, ProductSummary,
};
pub use order::{
    AdminOrder, NewOrder, NewOrderItem, NewReconciliation, Order, OrderCustomer, OrderInsert,
    OrderItem, OrderItemInput, OrderWithItems, PlaceOrderInput, Reconciliation,
};
pub use session::{CurrentUser, TokenGrant};
pub use user::{NewUser, ProfileUpdate, User};
pub use wishlist::{WishlistEntry, WishlistToggle};

use serde::{Deserialize, Deserializer};

/// Deserialize a field that distinguishes "absent" from "explicitly null".
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: absent yields `None`, `null` yields `Some(None)`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;

    use super::nullable;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        line2: Option<Option<String>>,
    }

    #[test]
    fn test_nullable_distinguishes_absent_from_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.line2, None);

        let null: Patch = serde_json::from_str(r#"{"line2": null}"#).unwrap();
        assert_eq!(null.line2, Some(None));

        let set: Patch = serde_json::from_str(r#"{"line2": "Apt 4"}"#).unwrap();
        assert_eq!(set.line2, Some(Some("Apt 4".to_owned())));
    }
}
