//! Authenticated request identity.

use serde::Serialize;

use atelier_core::{Email, UserId};

use super::User;

/// Identity resolved from a bearer token.
///
/// Minimal data carried through a request to identify the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Whether the user is an administrator.
    pub is_admin: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// A freshly issued bearer token and its owner, returned by register and login.
///
/// The raw token is only ever seen here; the store keeps its hash.
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub token: String,
    pub user: User,
}
