//! Database operations for the storefront `PostgreSQL`.
//!
//! # Tables
//!
//! - `app_user` - Customers and administrators (argon2 password hashes)
//! - `api_token` - SHA-256 hashes of issued bearer tokens
//! - `address` - Saved shipping addresses, one default per user
//! - `collection`, `product` - The catalog
//! - `cart_item` - Server-side cart rows, unique per `(user, product, size)`
//! - `wishlist_item` - Unique per `(user, product)`
//! - `customer_order`, `order_item` - Orders, unique per `payment_id`
//! - `payment_reconciliation` - Captured payments whose order failed to persist
//!
//! # Store traits
//!
//! Services depend on the per-entity traits ([`UserStore`], [`CatalogStore`],
//! [`CartStore`], [`WishlistStore`], [`AddressStore`], [`OrderStore`]) through
//! the combined [`Store`] trait object. [`PgStore`] is the production
//! implementation; `MemoryStore` backs tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p atelier-cli -- migrate
//! ```

pub mod addresses;
pub mod carts;
pub mod catalog;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod orders;
pub mod users;
pub mod wishlist;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::AddressStore;
pub use carts::CartStore;
pub use catalog::CatalogStore;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;
pub use orders::OrderStore;
pub use users::UserStore;
pub use wishlist::WishlistStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The backing store could not complete the operation.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
    pub(crate) fn conflict_on_unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// Everything the services need from persistence.
#[async_trait]
pub trait Store:
    UserStore + CatalogStore + CartStore + WishlistStore + AddressStore + OrderStore + Send + Sync
{
    /// Check that the store can serve requests.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// `PostgreSQL`-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
