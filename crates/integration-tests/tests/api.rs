//! Routing, authentication and error body tests.

#![allow(clippy::unwrap_used)]

use atelier_integration_tests::{PASSWORD, TestApp};
use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "atelier-storefront");

    let (status, _) = app.get("/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    app.store.set_unavailable(true);
    let (status, _) = app.get("/health/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_register_login_logout() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/register",
            None,
            json!({"name": "Ada", "email": "Ada@Example.com", "password": PASSWORD}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["is_admin"], false);
    assert!(body.get("password_hash").is_none());
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = app
        .post(
            "/login",
            None,
            json!({"email": "ada@example.com", "password": PASSWORD}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_owned();

    let (status, body) = app.get("/user", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ada");

    let (status, _) = app.send(Method::POST, "/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get("/user", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_register_validation_and_duplicates() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/register", None, json!({"name": "", "email": "nope", "password": "short"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_failed");
    for field in ["name", "email", "password"] {
        assert!(body["fields"][field].is_array(), "missing error for {field}");
    }

    app.customer("taken@example.com").await;
    let (status, body) = app
        .post(
            "/register",
            None,
            json!({"name": "Other", "email": "taken@example.com", "password": PASSWORD}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert!(body.get("fields").is_none());
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.customer("bob@example.com").await;

    let (status, body) = app
        .post(
            "/login",
            None,
            json!({"email": "bob@example.com", "password": "not-the-password"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_login_is_rate_limited() {
    let app = TestApp::new();
    let body = json!({"email": "nobody@example.com", "password": "whatever-it-is"});

    for _ in 0..5 {
        let (status, _) = app.post("/login", None, body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = app.post("/login", None, body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_profile_update() {
    let app = TestApp::new();
    let token = app.customer("carol@example.com").await;
    app.customer("dave@example.com").await;

    let (status, body) = app
        .post("/profile", Some(&token), json!({"name": "Carol Jones"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Profile updated");
    assert_eq!(body["user"]["name"], "Carol Jones");
    assert_eq!(body["user"]["email"], "carol@example.com");

    let (status, body) = app
        .post("/profile", Some(&token), json!({"email": "dave@example.com"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_customer_routes_require_a_token() {
    let app = TestApp::new();

    for uri in ["/cart", "/wishlist", "/addresses", "/orders", "/user"] {
        let (status, body) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "unauthorized");
    }

    let (status, _) = app.get("/cart", Some("not-a-real-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_the_admin_flag() {
    let app = TestApp::new();
    let customer = app.customer("eve@example.com").await;
    let admin = app.admin("root@example.com").await;

    let (status, body) = app.get("/admin/orders", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app.get("/admin/orders", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/admin/orders", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_malformed_requests() {
    let app = TestApp::new();
    let token = app.customer("frank@example.com").await;

    let (status, body) = app.get("/products/not-a-number", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = app.get("/products/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = app
        .post("/cart", Some(&token), json!({"quantity": 1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_admin_catalog_management() {
    let app = TestApp::new();
    let admin = app.admin("root@example.com").await;

    let (status, collection) = app
        .post(
            "/admin/collections",
            Some(&admin),
            json!({"name": "Evening Wear", "slug": "evening-wear"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let collection_id = collection["id"].as_i64().unwrap();

    let (status, body) = app
        .post(
            "/admin/collections",
            Some(&admin),
            json!({"name": "Duplicate", "slug": "evening-wear"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, product) = app
        .post(
            "/admin/products",
            Some(&admin),
            json!({
                "name": "Silk Dress",
                "description": "Floor length",
                "price": "240.00",
                "stock": 3,
                "collection_id": collection_id,
                "sizes": ["S", "M"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = product["id"].as_i64().unwrap();

    let (status, body) = app
        .get(&format!("/collections/{collection_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["products"][0]["id"], product_id);

    let (status, _) = app
        .delete(&format!("/admin/collections/{collection_id}"), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&format!("/products/{product_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["collection_id"].is_null());

    let (status, _) = app
        .delete(&format!("/admin/products/{product_id}"), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/products/{product_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
