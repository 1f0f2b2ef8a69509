//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness
//! GET    /health/ready                    - Readiness (store ping)
//!
//! # Account
//! POST   /register                        - Create account, returns token (rate limited)
//! POST   /login                           - Returns token (rate limited)
//! POST   /logout                          - Revoke token
//! GET    /user                            - Current profile
//! POST   /profile                         - Update name/email
//!
//! # Catalog (cached)
//! GET    /products                        - Product list
//! GET    /products/{id}                   - Product detail
//! GET    /collections                     - Collection list
//! GET    /collections/{id}                - Collection with products
//!
//! # Customer (bearer token)
//! GET    /addresses                       - Address list
//! POST   /addresses                       - Create address
//! GET    /addresses/{id}                  - Address detail
//! PUT    /addresses/{id}                  - Partial update
//! DELETE /addresses/{id}                  - Delete
//! GET    /cart                            - Cart with totals
//! POST   /cart                            - Add (merges same product and size)
//! PUT    /cart/{id}                       - Set quantity
//! DELETE /cart/{id}                       - Remove line
//! POST   /cart/sync                       - Merge guest cart
//! GET    /wishlist                        - Wishlist
//! POST   /wishlist/toggle                 - Add or remove
//! POST   /checkout                        - Create payment intent
//! GET    /orders                          - Order history
//! POST   /orders                          - Place order for a confirmed payment
//!
//! # Admin (bearer token, admin flag)
//! POST   /admin/products                  - Create product
//! PUT    /admin/products/{id}             - Partial update
//! DELETE /admin/products/{id}             - Delete
//! POST   /admin/collections               - Create collection
//! PUT    /admin/collections/{id}          - Partial update
//! DELETE /admin/collections/{id}          - Delete
//! GET    /admin/orders                    - All orders
//! GET    /admin/orders/{id}               - Order detail
//! PATCH  /admin/orders/{id}/status        - Status transition
//! GET    /admin/reconciliations           - Unresolved captured payments
//! POST   /admin/reconciliations/{id}/resolve
//! ```

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod collections;
mod extract;
pub mod health;
pub mod orders;
pub mod products;
pub mod wishlist;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, patch, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

pub use extract::{ApiJson, ApiPath};

use crate::middleware::{auth_rate_limiter, request_id_middleware};
use crate::state::AppState;

/// Create the rate-limited credential routes.
pub fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(auth_rate_limiter())
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::current_user))
        .route("/profile", post(auth::update_profile))
}

/// Create the public catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::index))
        .route("/products/{id}", get(products::show))
        .route("/collections", get(collections::index))
        .route("/collections/{id}", get(collections::show))
}

/// Create the customer routes router.
pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", get(addresses::index).post(addresses::create))
        .route(
            "/addresses/{id}",
            get(addresses::show)
                .put(addresses::update)
                .delete(addresses::delete),
        )
        .route("/cart", get(cart::show).post(cart::add))
        .route("/cart/sync", post(cart::sync))
        .route("/cart/{id}", put(cart::update).delete(cart::remove))
        .route("/wishlist", get(wishlist::index))
        .route("/wishlist/toggle", post(wishlist::toggle))
        .route("/checkout", post(orders::checkout))
        .route("/orders", get(orders::index).post(orders::create))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(admin::create_product))
        .route(
            "/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/collections", post(admin::create_collection))
        .route(
            "/collections/{id}",
            put(admin::update_collection).delete(admin::delete_collection),
        )
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}", get(admin::show_order))
        .route("/orders/{id}/status", patch(admin::update_order_status))
        .route("/reconciliations", get(admin::list_reconciliations))
        .route(
            "/reconciliations/{id}/resolve",
            post(admin::resolve_reconciliation),
        )
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(credential_routes())
        .merge(account_routes())
        .merge(catalog_routes())
        .merge(customer_routes())
        .nest("/admin", admin_routes())
}

/// Build the application with its request middleware.
///
/// Sentry layers are added by the binary around this router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config().cors_allowed_origins);

    let mut app = routes().layer(axum::middleware::from_fn(request_id_middleware));
    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                    user_id = tracing::field::Empty,
                    status = tracing::field::Empty,
                    latency_ms = tracing::field::Empty,
                )
            })
            .on_response(
                |response: &axum::http::Response<_>, latency: std::time::Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                },
            ),
    )
    .with_state(state)
}

/// CORS for the configured browser origins, or `None` when none are set.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}
