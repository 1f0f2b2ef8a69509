//! Authentication service.
//!
//! Password accounts with opaque bearer tokens. A token is 32 random bytes,
//! URL-safe base64 encoded and handed to the client once; the store only keeps
//! its SHA-256 hash.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use atelier_core::{Email, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::user::{LoginInput, ProfileInput, RegisterInput};
use crate::models::{NewUser, ProfileUpdate, TokenGrant, User};
use crate::services::FieldErrors;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length.
const MAX_NAME_LENGTH: usize = 255;

/// Random bytes per issued token.
const TOKEN_BYTES: usize = 32;

/// Authentication service.
///
/// Handles registration, login, token resolution and profile changes.
pub struct AuthService<'a> {
    store: &'a dyn Store,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Register a new user and issue their first token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if the name, email or password is invalid.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: &RegisterInput) -> Result<TokenGrant, AuthError> {
        let mut errors = FieldErrors::new();
        let name = errors.required_text("name", Some(&input.name), MAX_NAME_LENGTH);
        let email = match Email::parse(&input.email) {
            Ok(email) => Some(email),
            Err(e) => {
                errors.add("email", e.to_string());
                None
            }
        };
        if let Err(message) = validate_password(&input.password) {
            errors.add("password", message);
        }
        errors.into_result()?;
        let Some(email) = email else {
            return Err(AuthError::Validation(FieldErrors::single("email", "is invalid")));
        };

        let password_hash = hash_password(&input.password)?;

        let user = self
            .store
            .create_user(&NewUser {
                name,
                email,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, "User registered");
        self.issue_token(user).await
    }

    /// Check a password and issue a new token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, input))]
    pub async fn login(&self, input: &LoginInput) -> Result<TokenGrant, AuthError> {
        let email = Email::parse(&input.email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .store
            .get_user_with_password(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(&input.password, &password_hash)?;

        self.issue_token(user).await
    }

    /// Resolve a bearer token to its user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is unknown or revoked.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        self.store
            .get_user_by_token(&hash_token(token))
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// Revoke a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.store.delete_token(&hash_token(token)).await?;
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change the caller's name and/or email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if a submitted field is invalid.
    /// Returns `AuthError::UserAlreadyExists` if the new email belongs to someone else.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn update_profile(
        &self,
        user_id: UserId,
        input: &ProfileInput,
    ) -> Result<User, AuthError> {
        let mut errors = FieldErrors::new();
        let name = input
            .name
            .as_deref()
            .map(|name| errors.required_text("name", Some(name), MAX_NAME_LENGTH));
        let email = match input.email.as_deref().map(Email::parse) {
            Some(Ok(email)) => Some(email),
            Some(Err(e)) => {
                errors.add("email", e.to_string());
                None
            }
            None => None,
        };
        errors.into_result()?;

        self.store
            .update_profile(user_id, &ProfileUpdate { name, email })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?
            .ok_or(AuthError::UserNotFound)
    }

    async fn issue_token(&self, user: User) -> Result<TokenGrant, AuthError> {
        let token = generate_token();
        self.store.create_token(&hash_token(&token), user.id).await?;
        Ok(TokenGrant { token, user })
    }
}

/// Generate a new opaque bearer token.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest under which a token is stored.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "must be at least {MIN_PASSWORD_LENGTH} characters"
        ));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
