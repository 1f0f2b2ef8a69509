//! Address book service.
//!
//! A user has at most one default address. Creating or updating an address
//! with `is_default` clears the flag on the others in the same store
//! transaction.

use thiserror::Error;
use tracing::{info, instrument};

use atelier_core::{AddressId, Email, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::{Address, AddressFields, CreateAddressInput, UpdateAddressInput};
use crate::services::FieldErrors;

const MAX_NAME_LENGTH: usize = 255;
const MAX_LINE_LENGTH: usize = 255;
const MAX_MOBILE_LENGTH: usize = 20;
const MAX_REGION_LENGTH: usize = 100;
const MAX_ZIP_LENGTH: usize = 20;

/// Errors that can occur in address operations.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("address not found")]
    NotFound,

    /// The address belongs to another user.
    #[error("address belongs to another user")]
    Forbidden,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<FieldErrors> for AddressError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

/// The caller's saved addresses.
pub struct AddressService<'a> {
    store: &'a dyn Store,
}

impl<'a> AddressService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The user's addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Repository` if the store fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Address>, AddressError> {
        Ok(self.store.list_addresses(user_id).await?)
    }

    /// One of the user's addresses.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::NotFound` if it does not exist.
    /// Returns `AddressError::Forbidden` if it belongs to someone else.
    pub async fn get(&self, user_id: UserId, id: AddressId) -> Result<Address, AddressError> {
        let address = self
            .store
            .get_address(id)
            .await?
            .ok_or(AddressError::NotFound)?;
        if address.user_id != user_id {
            return Err(AddressError::Forbidden);
        }
        Ok(address)
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Validation` if a field is missing or invalid.
    #[instrument(skip(self, input), fields(user_id = %user_id, is_default = input.is_default))]
    pub async fn create(
        &self,
        user_id: UserId,
        input: &CreateAddressInput,
    ) -> Result<Address, AddressError> {
        let fields = validate(input)?;
        let address = self.store.create_address(user_id, &fields).await?;
        info!(address_id = %address.id, "Address created");
        Ok(address)
    }

    /// Apply a partial update to one of the user's addresses.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::NotFound` if it does not exist.
    /// Returns `AddressError::Forbidden` if it belongs to someone else.
    /// Returns `AddressError::Validation` if the merged address is invalid.
    #[instrument(skip(self, patch), fields(user_id = %user_id, address_id = %id))]
    pub async fn update(
        &self,
        user_id: UserId,
        id: AddressId,
        patch: &UpdateAddressInput,
    ) -> Result<Address, AddressError> {
        let existing = self.get(user_id, id).await?;
        let fields = validate(&merge(existing.fields, patch))?;

        let address = self
            .store
            .update_address(user_id, id, &fields)
            .await?
            .ok_or(AddressError::NotFound)?;
        info!(is_default = address.fields.is_default, "Address updated");
        Ok(address)
    }

    /// Delete one of the user's addresses. Deleting the default leaves the
    /// user without one.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::NotFound` if it does not exist.
    /// Returns `AddressError::Forbidden` if it belongs to someone else.
    #[instrument(skip(self), fields(user_id = %user_id, address_id = %id))]
    pub async fn delete(&self, user_id: UserId, id: AddressId) -> Result<(), AddressError> {
        self.get(user_id, id).await?;
        if !self.store.delete_address(user_id, id).await? {
            return Err(AddressError::NotFound);
        }
        info!("Address deleted");
        Ok(())
    }
}

/// Overlay a patch onto stored fields, producing a full input to validate.
fn merge(current: AddressFields, patch: &UpdateAddressInput) -> CreateAddressInput {
    let pick = |new: &Option<String>, old: String| Some(new.clone().unwrap_or(old));

    CreateAddressInput {
        name: pick(&patch.name, current.name),
        email: patch
            .email
            .clone()
            .unwrap_or_else(|| current.email.map(Email::into_inner)),
        mobile: pick(&patch.mobile, current.mobile),
        address_line1: pick(&patch.address_line1, current.address_line1),
        address_line2: patch.address_line2.clone().unwrap_or(current.address_line2),
        city: pick(&patch.city, current.city),
        state: pick(&patch.state, current.state),
        zip: pick(&patch.zip, current.zip),
        country: pick(&patch.country, current.country),
        is_default: patch.is_default.unwrap_or(current.is_default),
    }
}

/// Check every field, collecting all problems.
fn validate(input: &CreateAddressInput) -> Result<AddressFields, FieldErrors> {
    let mut errors = FieldErrors::new();

    let name = errors.required_text("name", input.name.as_deref(), MAX_NAME_LENGTH);
    let email = input
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .and_then(|e| match Email::parse(e) {
            Ok(email) => Some(email),
            Err(err) => {
                errors.add("email", err.to_string());
                None
            }
        });
    let mobile = errors.required_text("mobile", input.mobile.as_deref(), MAX_MOBILE_LENGTH);
    let address_line1 =
        errors.required_text("address_line1", input.address_line1.as_deref(), MAX_LINE_LENGTH);
    let address_line2 =
        errors.optional_text("address_line2", input.address_line2.as_deref(), MAX_LINE_LENGTH);
    let city = errors.required_text("city", input.city.as_deref(), MAX_REGION_LENGTH);
    let state = errors.required_text("state", input.state.as_deref(), MAX_REGION_LENGTH);
    let zip = errors.required_text("zip", input.zip.as_deref(), MAX_ZIP_LENGTH);
    let country = errors.required_text("country", input.country.as_deref(), MAX_REGION_LENGTH);

    errors.into_result()?;

    Ok(AddressFields {
        name,
        email,
        mobile,
        address_line1,
        address_line2,
        city,
        state,
        zip,
        country,
        is_default: input.is_default,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, UserStore};
    use crate::models::NewUser;

    fn input(name: &str, is_default: bool) -> CreateAddressInput {
        CreateAddressInput {
            name: Some(name.to_owned()),
            email: None,
            mobile: Some("+351 912 345 678".to_owned()),
            address_line1: Some("Rua Augusta 10".to_owned()),
            address_line2: None,
            city: Some("Lisbon".to_owned()),
            state: Some("Lisboa".to_owned()),
            zip: Some("1100-053".to_owned()),
            country: Some("PT".to_owned()),
            is_default,
        }
    }

    async fn user(store: &MemoryStore, email: &str) -> UserId {
        store
            .create_user(&NewUser {
                name: "Ada".to_owned(),
                email: Email::parse(email).unwrap(),
                password_hash: "x".to_owned(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_new_default_replaces_old_default() {
        let store = MemoryStore::new();
        let ada = user(&store, "ada@example.com").await;
        let addresses = AddressService::new(&store);

        let a = addresses.create(ada, &input("Home", true)).await.unwrap();
        let b = addresses.create(ada, &input("Office", true)).await.unwrap();

        let listed = addresses.list(ada).await.unwrap();
        assert_eq!(listed[0].id, b.id);
        assert!(listed[0].fields.is_default);
        assert!(!addresses.get(ada, a.id).await.unwrap().fields.is_default);
    }

    #[tokio::test]
    async fn test_update_can_make_default_and_clear_line2() {
        let store = MemoryStore::new();
        let ada = user(&store, "ada@example.com").await;
        let addresses = AddressService::new(&store);

        let home = addresses.create(ada, &input("Home", true)).await.unwrap();
        let mut office_input = input("Office", false);
        office_input.address_line2 = Some("Floor 3".to_owned());
        let office = addresses.create(ada, &office_input).await.unwrap();

        let patch: UpdateAddressInput =
            serde_json::from_str(r#"{"is_default": true, "address_line2": null}"#).unwrap();
        let updated = addresses.update(ada, office.id, &patch).await.unwrap();

        assert!(updated.fields.is_default);
        assert_eq!(updated.fields.address_line2, None);
        assert_eq!(updated.fields.name, "Office");
        assert!(!addresses.get(ada, home.id).await.unwrap().fields.is_default);
    }

    #[tokio::test]
    async fn test_other_users_address_is_forbidden() {
        let store = MemoryStore::new();
        let ada = user(&store, "ada@example.com").await;
        let bob = user(&store, "bob@example.com").await;
        let addresses = AddressService::new(&store);
        let home = addresses.create(ada, &input("Home", false)).await.unwrap();

        assert!(matches!(addresses.get(bob, home.id).await, Err(AddressError::Forbidden)));
        assert!(matches!(
            addresses.update(bob, home.id, &UpdateAddressInput::default()).await,
            Err(AddressError::Forbidden)
        ));
        assert!(matches!(addresses.delete(bob, home.id).await, Err(AddressError::Forbidden)));
        assert!(matches!(
            addresses.get(ada, AddressId::new(999)).await,
            Err(AddressError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_validation_limits() {
        let store = MemoryStore::new();
        let ada = user(&store, "ada@example.com").await;
        let addresses = AddressService::new(&store);

        let mut bad = input("Home", false);
        bad.mobile = Some("1".repeat(21));
        bad.email = Some("nope".to_owned());
        bad.city = None;

        let err = addresses.create(ada, &bad).await.unwrap_err();
        let AddressError::Validation(fields) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(fields.contains("mobile"));
        assert!(fields.contains("email"));
        assert!(fields.contains("city"));
        assert!(!fields.contains("zip"));
    }

    #[tokio::test]
    async fn test_deleting_default_promotes_nothing() {
        let store = MemoryStore::new();
        let ada = user(&store, "ada@example.com").await;
        let addresses = AddressService::new(&store);
        let home = addresses.create(ada, &input("Home", true)).await.unwrap();
        addresses.create(ada, &input("Office", false)).await.unwrap();

        addresses.delete(ada, home.id).await.unwrap();

        let listed = addresses.list(ada).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].fields.is_default);
    }
}
