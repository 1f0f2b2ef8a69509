//! Address book types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{AddressId, Email, UserId};

use super::nullable;

/// A saved shipping address. At most one per user has `is_default` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub fields: AddressFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated, writable address fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressFields {
    pub name: String,
    pub email: Option<Email>,
    pub mobile: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub is_default: bool,
}

/// Body of `POST /addresses`. Validated by the address service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAddressInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Body of `PUT /addresses/{id}`. Absent fields are left unchanged;
/// `email` and `address_line2` may be cleared with `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAddressInput {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    pub mobile: Option<String>,
    pub address_line1: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub address_line2: Option<Option<String>>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub is_default: Option<bool>,
}
