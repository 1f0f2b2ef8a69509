//! User and API token persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use atelier_core::{Email, UserId};

use super::{PgStore, RepositoryError};
use crate::models::{NewUser, ProfileUpdate, User};

/// User accounts and the bearer tokens issued to them.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user.
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError>;

    /// Get a user by ID.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user and their password hash by email.
    async fn get_user_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Apply a profile update. Returns `None` if the user does not exist.
    ///
    /// Returns `RepositoryError::Conflict` if the new email is taken.
    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, RepositoryError>;

    /// Grant or revoke admin rights. Returns `None` if no user has this email.
    async fn set_admin(&self, email: &Email, is_admin: bool)
    -> Result<Option<User>, RepositoryError>;

    /// Store the hash of a newly issued token.
    async fn create_token(&self, token_hash: &str, user_id: UserId) -> Result<(), RepositoryError>;

    /// Resolve a token hash to its user, recording the use.
    async fn get_user_by_token(&self, token_hash: &str) -> Result<Option<User>, RepositoryError>;

    /// Revoke a token. Returns whether it existed.
    async fn delete_token(&self, token_hash: &str) -> Result<bool, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    is_admin: bool,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            email,
            is_admin: row.is_admin,
            avatar_url: row.avatar_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserWithPasswordRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO app_user (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, is_admin, avatar_url, created_at, updated_at
            ",
        )
        .bind(&user.name)
        .bind(user.email.as_str())
        .bind(&user.password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "email already exists"))?;

        row.try_into()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name, email, is_admin, avatar_url, created_at, updated_at
            FROM app_user
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn get_user_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithPasswordRow>(
            r"
            SELECT id, name, email, is_admin, avatar_url, created_at, updated_at, password_hash
            FROM app_user
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(r) => Ok(Some((r.user.try_into()?, r.password_hash))),
            None => Ok(None),
        }
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            UPDATE app_user
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, is_admin, avatar_url, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.email.as_ref().map(Email::as_str))
        .fetch_optional(self.pool())
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "email already exists"))?
        .map(User::try_from)
        .transpose()
    }

    async fn set_admin(
        &self,
        email: &Email,
        is_admin: bool,
    ) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            UPDATE app_user
            SET is_admin = $2, updated_at = NOW()
            WHERE email = $1
            RETURNING id, name, email, is_admin, avatar_url, created_at, updated_at
            ",
        )
        .bind(email.as_str())
        .bind(is_admin)
        .fetch_optional(self.pool())
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn create_token(&self, token_hash: &str, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO api_token (token_hash, user_id) VALUES ($1, $2)")
            .bind(token_hash)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn get_user_by_token(&self, token_hash: &str) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            WITH touched AS (
                UPDATE api_token SET last_used_at = NOW()
                WHERE token_hash = $1
                RETURNING user_id
            )
            SELECT u.id, u.name, u.email, u.is_admin, u.avatar_url, u.created_at, u.updated_at
            FROM app_user u
            JOIN touched t ON t.user_id = u.id
            ",
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn delete_token(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM api_token WHERE token_hash = $1")
            .bind(token_hash)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
