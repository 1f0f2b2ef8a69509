//! Wishlist route handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::wishlist::ToggleWishlistInput;
use crate::models::{WishlistEntry, WishlistToggle};
use crate::routes::ApiJson;
use crate::services::WishlistService;
use crate::state::AppState;

/// Body of `POST /wishlist/toggle`.
#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub status: &'static str,
    pub in_wishlist: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<WishlistEntry>,
}

impl From<WishlistToggle> for ToggleResponse {
    fn from(toggle: WishlistToggle) -> Self {
        match toggle {
            WishlistToggle::Added(entry) => Self {
                status: "added",
                in_wishlist: true,
                item: Some(entry),
            },
            WishlistToggle::Removed => Self {
                status: "removed",
                in_wishlist: false,
                item: None,
            },
        }
    }
}

/// The caller's wishlist, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<WishlistEntry>>> {
    Ok(Json(WishlistService::new(state.store()).list(user.id).await?))
}

/// Add the product if absent (201), remove it if present (200).
#[instrument(skip(state, user, input), fields(user_id = %user.id, product_id = %input.product_id))]
pub async fn toggle(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<ToggleWishlistInput>,
) -> Result<(StatusCode, Json<ToggleResponse>)> {
    let toggled = WishlistService::new(state.store())
        .toggle(user.id, input.product_id)
        .await?;
    let status = match toggled {
        WishlistToggle::Added(_) => StatusCode::CREATED,
        WishlistToggle::Removed => StatusCode::OK,
    };
    Ok((status, Json(toggled.into())))
}
