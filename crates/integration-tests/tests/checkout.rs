//! Payment intents, order placement and admin order management.

#![allow(clippy::unwrap_used)]

use atelier_core::ProductId;
use atelier_integration_tests::{TestApp, decimal};
use atelier_storefront::payments::{PaymentError, PaymentIntentStatus};
use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};

/// Create an intent for `amount` and return its id.
async fn pay(app: &TestApp, token: &str, amount: &str) -> String {
    let (status, body) = app
        .post("/checkout", Some(token), json!({"amount": amount}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["client_secret"].as_str().unwrap().ends_with("_secret"));
    body["payment_id"].as_str().unwrap().to_owned()
}

fn order_body(items: &[(ProductId, i32, &str)], total: &str, payment_id: &str) -> Value {
    json!({
        "items": items
            .iter()
            .map(|(id, qty, price)| json!({"product_id": id, "quantity": qty, "price": price}))
            .collect::<Vec<_>>(),
        "total_amount": total,
        "payment_id": payment_id,
    })
}

#[tokio::test]
async fn test_checkout_then_order() {
    let app = TestApp::new();
    let token = app.customer("buyer@example.com").await;
    let coat = app.product("Wool Coat", "100.00", &[]).await;
    let belt = app.product("Belt", "50.00", &[]).await;

    app.post("/cart", Some(&token), json!({"product_id": coat})).await;
    app.post("/cart", Some(&token), json!({"product_id": belt})).await;

    let payment_id = pay(&app, &token, "150.00").await;
    let (status, order) = app
        .post(
            "/orders",
            Some(&token),
            order_body(&[(coat, 1, "100.00"), (belt, 1, "50.00")], "150.00", &payment_id),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "paid");
    assert_eq!(order["payment_id"], payment_id.as_str());
    assert_eq!(decimal(&order["total_amount"]), Decimal::new(15000, 2));
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert_eq!(order["items"][0]["product_name"], "Wool Coat");

    let (_, cart) = app.get("/cart", Some(&token)).await;
    assert_eq!(cart["items"], json!([]));

    let (status, history) = app.get("/orders", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["id"], order["id"]);
}

#[tokio::test]
async fn test_checkout_rejects_bad_amounts() {
    let app = TestApp::new();
    let token = app.customer("cheap@example.com").await;

    for amount in ["0", "-5.00", "0.001", "10000000000.00"] {
        let (status, body) = app
            .post("/checkout", Some(&token), json!({"amount": amount}))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{amount}");
        assert!(body["fields"]["amount"].is_array());
    }
    assert_eq!(app.payments.created_count(), 0);
}

#[tokio::test]
async fn test_gateway_failures_map_to_gateway_statuses() {
    let app = TestApp::new();
    let token = app.customer("slow@example.com").await;

    app.payments
        .fail_next(PaymentError::Timeout("read timed out".to_owned()));
    let (status, body) = app
        .post("/checkout", Some(&token), json!({"amount": "10.00"}))
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "payment_indeterminate");

    app.payments
        .fail_next(PaymentError::Api("card_declined".to_owned()));
    let (status, body) = app
        .post("/checkout", Some(&token), json!({"amount": "10.00"}))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "payment_failed");
}

#[tokio::test]
async fn test_repeated_payment_id_returns_the_first_order() {
    let app = TestApp::new();
    let token = app.customer("twice@example.com").await;
    let other = app.customer("thief@example.com").await;
    let lamp = app.product("Lamp", "75.00", &[]).await;

    let payment_id = pay(&app, &token, "75.00").await;
    let body = order_body(&[(lamp, 1, "75.00")], "75.00", &payment_id);

    let (status, first) = app.post("/orders", Some(&token), body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second) = app.post("/orders", Some(&token), body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["id"], first["id"]);
    assert_eq!(app.store.order_count(), 1);

    let (status, error) = app.post("/orders", Some(&other), body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "conflict");
    assert_eq!(app.store.order_count(), 1);
}

#[tokio::test]
async fn test_failed_order_write_is_all_or_nothing() {
    let app = TestApp::new();
    let token = app.customer("unlucky@example.com").await;
    let admin = app.admin("ops@example.com").await;
    let coat = app.product("Wool Coat", "100.00", &[]).await;
    let belt = app.product("Belt", "50.00", &[]).await;

    app.post("/cart", Some(&token), json!({"product_id": coat})).await;
    let payment_id = pay(&app, &token, "150.00").await;

    app.store.fail_order_item_at(1);
    let (status, body) = app
        .post(
            "/orders",
            Some(&token),
            order_body(&[(coat, 1, "100.00"), (belt, 1, "50.00")], "150.00", &payment_id),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "order_persistence_failed");
    assert_eq!(body["payment_id"], payment_id.as_str());

    assert_eq!(app.store.order_count(), 0);
    assert_eq!(app.store.order_item_count(), 0);
    let (_, cart) = app.get("/cart", Some(&token)).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);

    let (status, records) = app.get("/admin/reconciliations", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["payment_id"], payment_id.as_str());
    assert_eq!(decimal(&records[0]["amount"]), Decimal::new(15000, 2));

    let uri = format!("/admin/reconciliations/{}/resolve", records[0]["id"]);
    let (status, resolved) = app.post(&uri, Some(&admin), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!resolved["resolved_at"].is_null());
    let (_, records) = app.get("/admin/reconciliations", Some(&admin)).await;
    assert_eq!(records, json!([]));

    // The customer can retry with the same payment once the store recovers.
    let (status, order) = app
        .post(
            "/orders",
            Some(&token),
            order_body(&[(coat, 1, "100.00"), (belt, 1, "50.00")], "150.00", &payment_id),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_order_validation() {
    let app = TestApp::new();
    let token = app.customer("careful@example.com").await;
    let other = app.customer("neighbour@example.com").await;
    let vase = app.product("Vase", "40.00", &[]).await;

    let (status, body) = app
        .post("/orders", Some(&token), order_body(&[], "0", ""))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["items"].is_array());
    assert!(body["fields"]["payment_id"].is_array());

    let payment_id = pay(&app, &token, "80.00").await;
    let (status, body) = app
        .post(
            "/orders",
            Some(&token),
            order_body(&[(vase, 2, "40.00")], "79.00", &payment_id),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["total_amount"].is_array());

    let (status, body) = app
        .post(
            "/orders",
            Some(&token),
            order_body(&[(ProductId::new(9999), 2, "40.00")], "80.00", &payment_id),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["items.0.product_id"].is_array());

    let huge = "70000000000000000000000000000";
    let (status, body) = app
        .post("/orders", Some(&token), order_body(&[(vase, 2, huge)], huge, &payment_id))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["items.0.price"].is_array());

    let (_, foreign) = app
        .post(
            "/addresses",
            Some(&other),
            json!({
                "name": "Neighbour", "mobile": "555", "address_line1": "2 Side St",
                "city": "Town", "state": "CA", "zip": "90001", "country": "US",
            }),
        )
        .await;
    let mut body = order_body(&[(vase, 2, "40.00")], "80.00", &payment_id);
    body["address_id"] = foreign["id"].clone();
    let (status, body) = app.post("/orders", Some(&token), body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["address_id"].is_array());

    assert_eq!(app.store.order_count(), 0);
}

#[tokio::test]
async fn test_unconfirmed_payments_are_refused() {
    let app = TestApp::new();
    let token = app.customer("pending@example.com").await;
    let chair = app.product("Chair", "120.00", &[]).await;
    let body = |payment_id: &str| order_body(&[(chair, 1, "120.00")], "120.00", payment_id);

    app.payments
        .insert_intent("pi_pending", 12_000, PaymentIntentStatus::RequiresPaymentMethod);
    let (status, error) = app.post("/orders", Some(&token), body("pi_pending")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(error["error"], "payment_not_confirmed");

    app.payments
        .insert_intent("pi_short", 100, PaymentIntentStatus::Succeeded);
    let (status, _) = app.post("/orders", Some(&token), body("pi_short")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let (status, _) = app.post("/orders", Some(&token), body("pi_unknown")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    app.payments
        .set_status("pi_pending", PaymentIntentStatus::Succeeded);
    let (status, _) = app.post("/orders", Some(&token), body("pi_pending")).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_admin_status_lifecycle() {
    let app = TestApp::new();
    let token = app.customer("fan@example.com").await;
    let admin = app.admin("staff@example.com").await;
    let cap = app.product("Cap", "15.00", &[]).await;

    let payment_id = pay(&app, &token, "15.00").await;
    let (_, order) = app
        .post("/orders", Some(&token), order_body(&[(cap, 1, "15.00")], "15.00", &payment_id))
        .await;
    let order_id = order["id"].as_i64().unwrap();
    let uri = format!("/admin/orders/{order_id}/status");

    // Prime the customer's cached history.
    let (_, history) = app.get("/orders", Some(&token)).await;
    assert_eq!(history[0]["status"], "paid");

    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&admin), Some(json!({"status": "shipped"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    for next in ["processing", "shipped", "delivered"] {
        let (status, body) = app
            .send(
                Method::PATCH,
                &uri,
                Some(&admin),
                Some(json!({"status": next})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{next}");
        assert_eq!(body["status"], next);
    }

    let (status, _) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({"status": "cancelled"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({"status": "teleported"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["status"].is_array());

    let (_, history) = app.get("/orders", Some(&token)).await;
    assert_eq!(history[0]["status"], "delivered");

    let (status, all) = app.get("/admin/orders", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all[0]["customer"]["email"], "fan@example.com");
    assert_eq!(all[0]["status"], "delivered");

    let (status, detail) = app.get(&format!("/admin/orders/{order_id}"), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["items"][0]["product_name"], "Cap");
}
