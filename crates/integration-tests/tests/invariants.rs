//! Cart, wishlist, address book and cache guarantees, driven over HTTP.

#![allow(clippy::unwrap_used)]

use atelier_integration_tests::{TestApp, decimal};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::task::JoinSet;

fn address(name: &str, is_default: bool) -> Value {
    json!({
        "name": name,
        "mobile": "+1 555 0100",
        "address_line1": "1 Main Street",
        "city": "Springfield",
        "state": "IL",
        "zip": "62701",
        "country": "US",
        "is_default": is_default,
    })
}

async fn default_ids(app: &TestApp, token: &str) -> Vec<i64> {
    let (status, body) = app.get("/addresses", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array()
        .unwrap()
        .iter()
        .filter(|a| a["is_default"] == true)
        .map(|a| a["id"].as_i64().unwrap())
        .collect()
}

// ============================================================================
// Cart
// ============================================================================

#[tokio::test]
async fn test_repeated_adds_merge_into_one_row() {
    let app = TestApp::new();
    let token = app.customer("cart@example.com").await;
    let shirt = app.product("Linen Shirt", "45.00", &["S", "M"]).await;

    let (status, first) = app
        .post("/cart", Some(&token), json!({"product_id": shirt, "quantity": 2, "size": "M"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = app
        .post("/cart", Some(&token), json!({"product_id": shirt, "quantity": 3, "size": "M"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["quantity"], 5);

    let (status, _) = app
        .post("/cart", Some(&token), json!({"product_id": shirt, "size": "S"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, cart) = app.get("/cart", Some(&token)).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
    assert_eq!(cart["item_count"], 6);
    assert_eq!(decimal(&cart["subtotal"]), Decimal::new(27000, 2));
}

#[tokio::test]
async fn test_concurrent_adds_keep_one_row_and_the_cap() {
    let app = TestApp::new();
    let token = app.customer("race@example.com").await;
    let mug = app.product("Mug", "12.00", &[]).await;

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let app = app.clone();
        let token = token.clone();
        tasks.spawn(async move {
            app.post("/cart", Some(&token), json!({"product_id": mug, "quantity": 1}))
                .await
                .0
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert!(status.unwrap().is_success());
    }

    let (_, cart) = app.get("/cart", Some(&token)).await;
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 20);

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let app = app.clone();
        let token = token.clone();
        tasks.spawn(async move {
            app.post("/cart", Some(&token), json!({"product_id": mug, "quantity": 50}))
                .await
                .0
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert!(status.unwrap().is_success());
    }

    let (_, cart) = app.get("/cart", Some(&token)).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["items"][0]["quantity"], 99);
}

#[tokio::test]
async fn test_cart_rows_are_private() {
    let app = TestApp::new();
    let owner = app.customer("owner@example.com").await;
    let intruder = app.customer("intruder@example.com").await;
    let hat = app.product("Hat", "30.00", &[]).await;

    let (_, line) = app
        .post("/cart", Some(&owner), json!({"product_id": hat}))
        .await;
    let uri = format!("/cart/{}", line["id"]);

    let (status, _) = app.put(&uri, Some(&intruder), json!({"quantity": 4})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete(&uri, Some(&intruder)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, cart) = app.get("/cart", Some(&owner)).await;
    assert_eq!(cart["items"][0]["quantity"], 1);

    let (status, body) = app.put(&uri, Some(&owner), json!({"quantity": 100})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["quantity"].is_array());

    let (status, body) = app.put(&uri, Some(&owner), json!({"quantity": 4})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 4);
    assert_eq!(decimal(&body["line_total"]), Decimal::new(12000, 2));
}

#[tokio::test]
async fn test_size_rules_on_add() {
    let app = TestApp::new();
    let token = app.customer("sizes@example.com").await;
    let jacket = app.product("Jacket", "180.00", &["S", "M", "L"]).await;

    let (status, body) = app
        .post("/cart", Some(&token), json!({"product_id": jacket}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["size"].is_array());

    let (status, body) = app
        .post("/cart", Some(&token), json!({"product_id": jacket, "size": "XXL"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["size"].is_array());

    let (status, _) = app
        .post("/cart", Some(&token), json!({"product_id": 9999}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_guest_cart_sync() {
    let app = TestApp::new();
    let token = app.customer("guest@example.com").await;
    let scarf = app.product("Scarf", "25.00", &[]).await;
    let boots = app.product("Boots", "140.00", &["40", "41"]).await;

    app.post("/cart", Some(&token), json!({"product_id": scarf, "quantity": 1}))
        .await;

    let (status, body) = app
        .post(
            "/cart/sync",
            Some(&token),
            json!({"items": [
                {"product_id": scarf, "quantity": 2},
                {"product_id": 9999, "quantity": 1},
                {"product_id": boots, "quantity": 1},
                {"product_id": boots, "quantity": 1, "size": "41"},
            ]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let rejected: Vec<u64> = body["rejected"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["index"].as_u64().unwrap())
        .collect();
    assert_eq!(rejected, vec![1, 2]);

    let items = body["cart"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let scarf_line = items.iter().find(|i| i["product_id"] == json!(scarf)).unwrap();
    assert_eq!(scarf_line["quantity"], 3);
    let boots_line = items.iter().find(|i| i["product_id"] == json!(boots)).unwrap();
    assert_eq!(boots_line["size"], "41");
}

// ============================================================================
// Wishlist
// ============================================================================

#[tokio::test]
async fn test_wishlist_toggle_is_a_switch() {
    let app = TestApp::new();
    let token = app.customer("wish@example.com").await;
    let ring = app.product("Ring", "95.00", &[]).await;

    let (status, body) = app
        .post("/wishlist/toggle", Some(&token), json!({"product_id": ring}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "added");
    assert_eq!(body["in_wishlist"], true);
    assert_eq!(body["item"]["product"]["name"], "Ring");

    let (_, list) = app.get("/wishlist", Some(&token)).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = app
        .post("/wishlist/toggle", Some(&token), json!({"product_id": ring}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "removed");
    assert_eq!(body["in_wishlist"], false);
    assert!(body.get("item").is_none());

    let (_, list) = app.get("/wishlist", Some(&token)).await;
    assert_eq!(list, json!([]));

    let (status, _) = app
        .post("/wishlist/toggle", Some(&token), json!({"product_id": 9999}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_toggles_never_duplicate() {
    let app = TestApp::new();
    let token = app.customer("flip@example.com").await;
    let bag = app.product("Bag", "60.00", &[]).await;

    let mut tasks = JoinSet::new();
    for _ in 0..9 {
        let app = app.clone();
        let token = token.clone();
        tasks.spawn(async move {
            app.post("/wishlist/toggle", Some(&token), json!({"product_id": bag}))
                .await
                .0
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert!(status.unwrap().is_success());
    }

    // An odd number of toggles from an empty list ends with the item in.
    let (_, list) = app.get("/wishlist", Some(&token)).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

// ============================================================================
// Address book
// ============================================================================

#[tokio::test]
async fn test_new_default_address_takes_over() {
    let app = TestApp::new();
    let token = app.customer("home@example.com").await;

    let (status, a) = app.post("/addresses", Some(&token), address("Home", true)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, b) = app.post("/addresses", Some(&token), address("Office", true)).await;
    let (a, b) = (a["id"].as_i64().unwrap(), b["id"].as_i64().unwrap());

    assert_eq!(default_ids(&app, &token).await, vec![b]);

    let (status, body) = app
        .put(&format!("/addresses/{a}"), Some(&token), json!({"is_default": true}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_default"], true);
    assert_eq!(body["name"], "Home");
    assert_eq!(default_ids(&app, &token).await, vec![a]);

    let (status, _) = app.delete(&format!("/addresses/{a}"), Some(&token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(default_ids(&app, &token).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_defaults_leave_exactly_one() {
    let app = TestApp::new();
    let token = app.customer("many@example.com").await;

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let app = app.clone();
        let token = token.clone();
        tasks.spawn(async move {
            app.post("/addresses", Some(&token), address(&format!("Address {i}"), true))
                .await
                .0
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::CREATED);
    }

    assert_eq!(default_ids(&app, &token).await.len(), 1);
}

#[tokio::test]
async fn test_addresses_are_private_and_validated() {
    let app = TestApp::new();
    let owner = app.customer("mine@example.com").await;
    let other = app.customer("theirs@example.com").await;

    let (_, created) = app.post("/addresses", Some(&owner), address("Home", false)).await;
    let uri = format!("/addresses/{}", created["id"]);

    let (status, body) = app.get(&uri, Some(&other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    let (status, _) = app.put(&uri, Some(&other), json!({"city": "Elsewhere"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, Some(&other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/addresses/9999", Some(&other)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post("/addresses", Some(&owner), json!({"name": "Incomplete", "email": "bad"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    for field in ["email", "mobile", "address_line1", "city", "state", "zip", "country"] {
        assert!(body["fields"][field].is_array(), "missing error for {field}");
    }
}

// ============================================================================
// Cache coherence
// ============================================================================

#[tokio::test]
async fn test_catalog_reads_reflect_admin_writes() {
    let app = TestApp::new();
    let admin = app.admin("buyer@example.com").await;
    let tee = app.product("Tee", "20.00", &[]).await;

    let (_, listing) = app.get("/products", None).await;
    assert_eq!(decimal(&listing[0]["price"]), Decimal::new(2000, 2));
    let (_, detail) = app.get(&format!("/products/{tee}"), None).await;
    assert_eq!(detail["name"], "Tee");

    let (status, _) = app
        .put(
            &format!("/admin/products/{tee}"),
            Some(&admin),
            json!({"name": "Organic Tee", "price": "24.00"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = app.get("/products", None).await;
    assert_eq!(decimal(&listing[0]["price"]), Decimal::new(2400, 2));
    let (_, detail) = app.get(&format!("/products/{tee}"), None).await;
    assert_eq!(detail["name"], "Organic Tee");

    let (status, _) = app
        .post(
            "/admin/products",
            Some(&admin),
            json!({"name": "Socks", "description": "Wool", "price": "9.00", "stock": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, listing) = app.get("/products", None).await;
    assert_eq!(listing.as_array().unwrap().len(), 2);
}
