//! Address book route handlers.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use atelier_core::AddressId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Address, CreateAddressInput, UpdateAddressInput};
use crate::routes::{ApiJson, ApiPath};
use crate::services::AddressService;
use crate::state::AppState;

/// The caller's addresses, default first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Address>>> {
    Ok(Json(AddressService::new(state.store()).list(user.id).await?))
}

/// Save a new address.
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<CreateAddressInput>,
) -> Result<(StatusCode, Json<Address>)> {
    let address = AddressService::new(state.store()).create(user.id, &input).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// One of the caller's addresses.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<AddressId>,
) -> Result<Json<Address>> {
    Ok(Json(AddressService::new(state.store()).get(user.id, id).await?))
}

/// Partially update one of the caller's addresses.
#[instrument(skip(state, user, patch), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<AddressId>,
    ApiJson(patch): ApiJson<UpdateAddressInput>,
) -> Result<Json<Address>> {
    let address = AddressService::new(state.store())
        .update(user.id, id, &patch)
        .await?;
    Ok(Json(address))
}

/// Delete one of the caller's addresses.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<AddressId>,
) -> Result<StatusCode> {
    AddressService::new(state.store()).delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
