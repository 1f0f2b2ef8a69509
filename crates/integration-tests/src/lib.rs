//! Integration tests for Atelier.
//!
//! The tests drive the full storefront router in-process: real routing,
//! extractors, middleware and services over the in-memory store and the fake
//! payment gateway. No database or network is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `api` - Routing, authentication and error bodies
//! - `invariants` - Cart, wishlist, address and cache guarantees
//! - `checkout` - Payment intents and order placement

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::sync::Arc;

use atelier_core::{Email, ProductId};
use atelier_storefront::config::StorefrontConfig;
use atelier_storefront::db::{CatalogStore, MemoryStore, UserStore};
use atelier_storefront::models::ProductFields;
use atelier_storefront::models::user::RegisterInput;
use atelier_storefront::payments::FakeGateway;
use atelier_storefront::routes;
use atelier_storefront::services::AuthService;
use atelier_storefront::state::AppState;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

/// Password used for every seeded account.
pub const PASSWORD: &str = "correct-horse-battery";

/// A storefront wired to in-memory backends.
#[derive(Clone)]
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub payments: Arc<FakeGateway>,
    router: Router,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// Build the app with the test configuration (cache enabled).
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let payments = Arc::new(FakeGateway::new());
        let state = AppState::new(
            StorefrontConfig::for_testing(),
            store.clone(),
            payments.clone(),
        );

        Self {
            store,
            payments,
            router: routes::router(state),
        }
    }

    /// Send a request and return the status and JSON body (`Null` if empty).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }

    /// Register a customer directly through the auth service, bypassing the
    /// rate-limited route, and return their bearer token.
    pub async fn customer(&self, email: &str) -> String {
        let grant = AuthService::new(self.store.as_ref())
            .register(&RegisterInput {
                name: "Test Customer".to_owned(),
                email: email.to_owned(),
                password: PASSWORD.to_owned(),
            })
            .await
            .unwrap();
        grant.token
    }

    /// Register an administrator and return their bearer token.
    pub async fn admin(&self, email: &str) -> String {
        let token = self.customer(email).await;
        self.store
            .set_admin(&Email::parse(email).unwrap(), true)
            .await
            .unwrap()
            .unwrap();
        token
    }

    /// Insert a product straight into the store.
    pub async fn product(&self, name: &str, price: &str, sizes: &[&str]) -> ProductId {
        self.store
            .create_product(&ProductFields {
                name: name.to_owned(),
                description: format!("{name} description"),
                price: price.parse::<Decimal>().unwrap(),
                stock: 10,
                collection_id: None,
                sizes: sizes.iter().map(|s| (*s).to_owned()).collect(),
                image_url: None,
                images: Vec::new(),
            })
            .await
            .unwrap()
            .id
    }
}

/// Parse a decimal rendered as a JSON string or number.
#[must_use]
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}
