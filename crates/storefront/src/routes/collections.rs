//! Public catalog: collections.

use axum::{Json, extract::State};
use tracing::instrument;

use atelier_core::CollectionId;

use crate::error::Result;
use crate::models::{Collection, CollectionWithProducts};
use crate::routes::ApiPath;
use crate::services::CatalogService;
use crate::state::AppState;

/// All collections, by name.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Collection>>> {
    let collections = CatalogService::new(state.store(), state.cache())
        .list_collections()
        .await?;
    Ok(Json(collections))
}

/// One collection with its products.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CollectionId>,
) -> Result<Json<CollectionWithProducts>> {
    let collection = CatalogService::new(state.store(), state.cache())
        .get_collection(id)
        .await?;
    Ok(Json(collection))
}
