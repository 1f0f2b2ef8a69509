//! Public catalog: products.

use axum::{Json, extract::State};
use tracing::instrument;

use atelier_core::ProductId;

use crate::error::Result;
use crate::models::Product;
use crate::routes::ApiPath;
use crate::services::CatalogService;
use crate::state::AppState;

/// All products, newest first.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let products = CatalogService::new(state.store(), state.cache())
        .list_products()
        .await?;
    Ok(Json(products))
}

/// One product.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Product>> {
    let product = CatalogService::new(state.store(), state.cache())
        .get_product(id)
        .await?;
    Ok(Json(product))
}
