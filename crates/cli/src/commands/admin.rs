//! Administrator management commands.
//!
//! # Usage
//!
//! ```bash
//! atelier-cli admin grant -e admin@example.com
//! atelier-cli admin revoke -e admin@example.com
//! ```
//!
//! The user must already have registered through the API.

use atelier_core::Email;
use atelier_storefront::db::{PgStore, RepositoryError, UserStore};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    /// Repository error.
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No registered user with this email.
    #[error("No user registered with email: {0}")]
    UserNotFound(String),
}

/// Set or clear the admin flag of a registered user.
///
/// # Errors
///
/// Returns `AdminError::UserNotFound` if no user has this email.
pub async fn set_admin(email: &str, is_admin: bool) -> Result<(), AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let store = PgStore::new(connect().await?);

    let Some(user) = store.set_admin(&email, is_admin).await? else {
        return Err(AdminError::UserNotFound(email.into_inner()));
    };

    if is_admin {
        tracing::info!(user_id = %user.id, email = %email.as_str(), "Admin rights granted");
    } else {
        tracing::info!(user_id = %user.id, email = %email.as_str(), "Admin rights revoked");
    }
    Ok(())
}
