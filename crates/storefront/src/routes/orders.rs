//! Checkout and order history route handlers.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::order::CheckoutInput;
use crate::models::{OrderWithItems, PlaceOrderInput};
use crate::routes::ApiJson;
use crate::services::{OrderService, PaymentSession};
use crate::state::AppState;

/// Create a payment intent the browser confirms with the processor.
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<CheckoutInput>,
) -> Result<Json<PaymentSession>> {
    let session = state.checkout().create_payment_intent(user.id, &input).await?;
    Ok(Json(session))
}

/// Place the order paid for by a confirmed payment.
///
/// Responds 201 for a new order and 200 when the payment had already
/// produced one.
#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<PlaceOrderInput>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let placed = state.checkout().place_order(user.id, &input).await?;
    let status = if placed.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(placed.order)))
}

/// The caller's most recent orders.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<OrderWithItems>>> {
    let orders = OrderService::new(state.store(), state.cache())
        .list_user_orders(user.id)
        .await?;
    Ok(Json(orders))
}
