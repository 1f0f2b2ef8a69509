//! Admin route handlers: catalog management, orders and reconciliation.
//!
//! Every handler requires [`RequireAdmin`]; non-admins get 403.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use atelier_core::{CollectionId, OrderId, ProductId, ReconciliationId};

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::order::UpdateStatusInput;
use crate::models::{
    AdminOrder, Collection, CollectionInput, CollectionPatch, Order, OrderWithItems, Product,
    ProductInput, ProductPatch, Reconciliation,
};
use crate::routes::{ApiJson, ApiPath};
use crate::services::{CatalogService, OrderService};
use crate::state::AppState;

// =============================================================================
// Catalog
// =============================================================================

#[instrument(skip(state, admin, input), fields(admin_id = %admin.id))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(input): ApiJson<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = CatalogService::new(state.store(), state.cache())
        .create_product(&input)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state, admin, patch), fields(admin_id = %admin.id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<Product>> {
    let product = CatalogService::new(state.store(), state.cache())
        .update_product(id, &patch)
        .await?;
    Ok(Json(product))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode> {
    CatalogService::new(state.store(), state.cache())
        .delete_product(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin, input), fields(admin_id = %admin.id))]
pub async fn create_collection(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(input): ApiJson<CollectionInput>,
) -> Result<(StatusCode, Json<Collection>)> {
    let collection = CatalogService::new(state.store(), state.cache())
        .create_collection(&input)
        .await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

#[instrument(skip(state, admin, patch), fields(admin_id = %admin.id))]
pub async fn update_collection(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CollectionId>,
    ApiJson(patch): ApiJson<CollectionPatch>,
) -> Result<Json<Collection>> {
    let collection = CatalogService::new(state.store(), state.cache())
        .update_collection(id, &patch)
        .await?;
    Ok(Json(collection))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_collection(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CollectionId>,
) -> Result<StatusCode> {
    CatalogService::new(state.store(), state.cache())
        .delete_collection(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Orders
// =============================================================================

/// The most recent orders of all customers.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<Vec<AdminOrder>>> {
    let orders = OrderService::new(state.store(), state.cache())
        .list_all_orders()
        .await?;
    Ok(Json(orders))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn show_order(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderWithItems>> {
    let order = OrderService::new(state.store(), state.cache())
        .get_order(id)
        .await?;
    Ok(Json(order))
}

/// Move an order along the status machine.
#[instrument(skip(state, admin, input), fields(admin_id = %admin.id))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(input): ApiJson<UpdateStatusInput>,
) -> Result<Json<Order>> {
    let order = OrderService::new(state.store(), state.cache())
        .update_status(id, &input)
        .await?;
    Ok(Json(order))
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Captured payments whose orders were never written.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_reconciliations(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<Vec<Reconciliation>>> {
    let records = OrderService::new(state.store(), state.cache())
        .list_reconciliations()
        .await?;
    Ok(Json(records))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn resolve_reconciliation(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ReconciliationId>,
) -> Result<Json<Reconciliation>> {
    let record = OrderService::new(state.store(), state.cache())
        .resolve_reconciliation(id)
        .await?;
    Ok(Json(record))
}
