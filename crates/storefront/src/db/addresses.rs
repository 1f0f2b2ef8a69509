//! Address book persistence.
//!
//! Every write that may set `is_default` runs in a transaction that first
//! locks the owner's `app_user` row, so two concurrent default changes for
//! the same user serialize. The partial unique index
//! `address_one_default_per_user` backs this up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use atelier_core::{AddressId, Email, UserId};

use super::{PgStore, RepositoryError};
use crate::models::{Address, AddressFields};

/// Saved addresses, at most one default per user.
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// The user's addresses, default first, then newest first.
    async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError>;

    /// Get an address by ID regardless of owner.
    async fn get_address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError>;

    /// Insert an address. When `fields.is_default` is set, every other
    /// address of the user is cleared in the same transaction.
    async fn create_address(
        &self,
        user_id: UserId,
        fields: &AddressFields,
    ) -> Result<Address, RepositoryError>;

    /// Overwrite one of the user's addresses, with the same default handling
    /// as [`AddressStore::create_address`]. Returns `None` if the address does
    /// not exist or belongs to someone else.
    async fn update_address(
        &self,
        user_id: UserId,
        id: AddressId,
        fields: &AddressFields,
    ) -> Result<Option<Address>, RepositoryError>;

    /// Delete one of the user's addresses. Returns whether it existed.
    async fn delete_address(&self, user_id: UserId, id: AddressId)
    -> Result<bool, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: AddressId,
    user_id: UserId,
    name: String,
    email: Option<String>,
    mobile: String,
    address_line1: String,
    address_line2: Option<String>,
    city: String,
    state: String,
    zip: String,
    country: String,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AddressRow> for Address {
    type Error = RepositoryError;

    fn try_from(row: AddressRow) -> Result<Self, Self::Error> {
        let email = row
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid address email in database: {e}"))
            })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            fields: AddressFields {
                name: row.name,
                email,
                mobile: row.mobile,
                address_line1: row.address_line1,
                address_line2: row.address_line2,
                city: row.city,
                state: row.state,
                zip: row.zip,
                country: row.country,
                is_default: row.is_default,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Lock the owner's row and, if requested, clear their current default.
async fn prepare_default(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    except: Option<AddressId>,
    is_default: bool,
) -> Result<(), RepositoryError> {
    sqlx::query("SELECT id FROM app_user WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

    if is_default {
        sqlx::query(
            r"
            UPDATE address
            SET is_default = FALSE, updated_at = NOW()
            WHERE user_id = $1 AND is_default AND ($2::INTEGER IS NULL OR id <> $2)
            ",
        )
        .bind(user_id)
        .bind(except)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl AddressStore for PgStore {
    async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        sqlx::query_as::<_, AddressRow>(
            r"
            SELECT id, user_id, name, email, mobile, address_line1, address_line2,
                   city, state, zip, country, is_default, created_at, updated_at
            FROM address
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .map(Address::try_from)
        .collect()
    }

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        sqlx::query_as::<_, AddressRow>(
            r"
            SELECT id, user_id, name, email, mobile, address_line1, address_line2,
                   city, state, zip, country, is_default, created_at, updated_at
            FROM address
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .map(Address::try_from)
        .transpose()
    }

    async fn create_address(
        &self,
        user_id: UserId,
        fields: &AddressFields,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool().begin().await?;
        prepare_default(&mut tx, user_id, None, fields.is_default).await?;

        let row = sqlx::query_as::<_, AddressRow>(
            r"
            INSERT INTO address
                (user_id, name, email, mobile, address_line1, address_line2,
                 city, state, zip, country, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, user_id, name, email, mobile, address_line1, address_line2,
                      city, state, zip, country, is_default, created_at, updated_at
            ",
        )
        .bind(user_id)
        .bind(&fields.name)
        .bind(fields.email.as_ref().map(Email::as_str))
        .bind(&fields.mobile)
        .bind(&fields.address_line1)
        .bind(fields.address_line2.as_deref())
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.zip)
        .bind(&fields.country)
        .bind(fields.is_default)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "user already has a default address"))?;

        tx.commit().await?;
        row.try_into()
    }

    async fn update_address(
        &self,
        user_id: UserId,
        id: AddressId,
        fields: &AddressFields,
    ) -> Result<Option<Address>, RepositoryError> {
        let mut tx = self.pool().begin().await?;
        prepare_default(&mut tx, user_id, Some(id), fields.is_default).await?;

        let row = sqlx::query_as::<_, AddressRow>(
            r"
            UPDATE address
            SET name = $3, email = $4, mobile = $5, address_line1 = $6, address_line2 = $7,
                city = $8, state = $9, zip = $10, country = $11, is_default = $12,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, email, mobile, address_line1, address_line2,
                      city, state, zip, country, is_default, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(&fields.name)
        .bind(fields.email.as_ref().map(Email::as_str))
        .bind(&fields.mobile)
        .bind(&fields.address_line1)
        .bind(fields.address_line2.as_deref())
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.zip)
        .bind(&fields.country)
        .bind(fields.is_default)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::conflict_on_unique(e, "user already has a default address"))?;

        tx.commit().await?;
        row.map(Address::try_from).transpose()
    }

    async fn delete_address(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM address WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
