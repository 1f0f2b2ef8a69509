//! Business logic services for storefront.
//!
//! Services borrow the [`Store`](crate::db::Store) (and, where needed, the
//! response cache and payment gateway) for the duration of one request. The
//! acting user is always an explicit argument.
//!
//! # Services
//!
//! - `auth` - Registration, login, bearer tokens, profile
//! - `catalog` - Cached product/collection reads, admin writes with tag invalidation
//! - `cart` - Server cart: add, update, remove, guest cart merge
//! - `wishlist` - List and toggle
//! - `addresses` - Address book with a single default per user
//! - `checkout` - Payment intents and order placement
//! - `orders` - Order history, admin status changes, payment reconciliation

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod validation;
pub mod wishlist;

pub use addresses::{AddressError, AddressService};
pub use auth::{AuthError, AuthService};
pub use cart::{CartError, CartService};
pub use catalog::{CatalogError, CatalogService};
pub use checkout::{CheckoutService, PaymentSession, PlacedOrder};
pub use orders::{OrderError, OrderService};
pub use validation::FieldErrors;
pub use wishlist::{WishlistError, WishlistService};
