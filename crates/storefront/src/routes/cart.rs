//! Server-side cart route handlers.
//!
//! All cart operations are scoped to the authenticated caller. `POST
//! /cart/sync` merges a guest cart kept by the client into the server cart
//! after login.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use atelier_core::CartItemId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::cart::{SyncCartInput, UpdateCartInput};
use crate::models::{Cart, CartItemInput, CartLine, SyncOutcome};
use crate::routes::{ApiJson, ApiPath};
use crate::state::AppState;

/// The caller's cart with totals.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(State(state): State<AppState>, RequireAuth(user): RequireAuth) -> Result<Json<Cart>> {
    Ok(Json(state.cart().list(user.id).await?))
}

/// Add a product, merging into an existing line for the same size.
///
/// Responds 201 when a line was created and 200 when one was incremented.
#[instrument(skip(state, user, input), fields(user_id = %user.id, product_id = %input.product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<CartItemInput>,
) -> Result<(StatusCode, Json<CartLine>)> {
    let added = state.cart().add(user.id, &input).await?;
    let status = if added.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(added.line)))
}

/// Set a line's quantity.
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<CartItemId>,
    ApiJson(input): ApiJson<UpdateCartInput>,
) -> Result<Json<CartLine>> {
    Ok(Json(state.cart().update_quantity(user.id, id, &input).await?))
}

/// Remove a line. Removing a line that is already gone succeeds.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<CartItemId>,
) -> Result<StatusCode> {
    state.cart().remove(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Merge a guest cart into the caller's cart.
#[instrument(skip(state, user, input), fields(user_id = %user.id, entries = input.items.len()))]
pub async fn sync(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<SyncCartInput>,
) -> Result<Json<SyncOutcome>> {
    Ok(Json(state.cart().sync(user.id, &input).await?))
}
