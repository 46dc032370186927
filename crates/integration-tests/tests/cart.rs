//! Cart, cart sync, and checkout.

use std::time::Duration;

use myrmeco_integration_tests::{TOKEN, TestApp, location};
use reqwest::StatusCode;
use serde_json::json;

/// Longer than the 200 ms sync window plus request latency.
const SETTLE: Duration = Duration::from_millis(700);

async fn cart_count(app: &TestApp) -> String {
    app.page("/cart/count").await
}

// ============================================================================
// Guest Cart
// ============================================================================

#[tokio::test]
async fn test_guest_add_to_cart() {
    let app = TestApp::spawn().await;

    let resp = app.add_to_cart("S", "2").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/plants/1?sku=S");

    assert!(cart_count(&app).await.contains(">2<"));

    let body = app.page("/cart").await;
    assert!(body.contains("Ant plant"));
    assert!(body.contains("¥176.00"));
    assert!(body.contains("2 plants"));
    assert!(body.contains("Added Ant plant (S) to your cart"));

    // Guests are never synced
    tokio::time::sleep(SETTLE).await;
    assert!(app.backend.recorded().cart_syncs.is_empty());
}

#[tokio::test]
async fn test_add_merges_lines_and_caps_at_stock() {
    let app = TestApp::spawn().await;

    app.add_to_cart("M", "1").await;
    app.add_to_cart("M", "9").await;

    assert!(cart_count(&app).await.contains(">2<"));
    let body = app.page("/cart").await;
    assert!(body.contains("Maximum available"));
}

#[tokio::test]
async fn test_add_sold_out_size_is_refused() {
    let app = TestApp::spawn().await;

    let resp = app.add_to_cart("L", "1").await;
    assert_eq!(location(&resp), "/plants/1");
    assert!(cart_count(&app).await.contains(">0<"));

    let body = app.page("/plants/1").await;
    assert!(body.contains("This size is sold out"));
}

#[tokio::test]
async fn test_update_and_remove_lines() {
    let app = TestApp::spawn().await;
    app.add_to_cart("S", "1").await;

    let line = [("plant_id", "1"), ("size", "S")];
    let resp = app
        .post("/cart/update", &[line[0], line[1], ("action", "increase")])
        .await;
    assert_eq!(location(&resp), "/cart");
    assert!(cart_count(&app).await.contains(">2<"));

    app.post(
        "/cart/update",
        &[line[0], line[1], ("action", "set"), ("quantity", "0")],
    )
    .await;
    assert!(cart_count(&app).await.contains(">1<"));

    app.post("/cart/update", &[line[0], line[1], ("action", "decrease")])
        .await;
    assert!(cart_count(&app).await.contains(">1<"));

    let resp = app.post("/cart/remove", &line).await;
    assert_eq!(location(&resp), "/cart");
    assert!(cart_count(&app).await.contains(">0<"));
    assert!(app.page("/cart").await.contains("Your cart is empty"));
}

#[tokio::test]
async fn test_clear_cart() {
    let app = TestApp::spawn().await;
    app.add_to_cart("S", "1").await;
    app.add_to_cart("M", "1").await;

    let resp = app.post("/cart/clear", &[]).await;
    assert_eq!(location(&resp), "/cart");
    assert!(cart_count(&app).await.contains(">0<"));
}

// ============================================================================
// Quick Cart
// ============================================================================

#[tokio::test]
async fn test_quick_cart_drawer() {
    let app = TestApp::spawn().await;

    let body = app.page("/?cart=open").await;
    assert!(body.contains("quick-cart-title"));
    assert!(body.contains("Keep browsing"));

    app.add_to_cart("S", "2").await;

    let body = app.page("/plants/1?cart=open").await;
    assert!(body.contains("quick-cart-title"));
    assert!(body.contains("Go to cart"));
    assert!(body.contains("¥176.00"));
    assert!(body.contains(r#"<input type="hidden" name="next" value="/plants/1">"#));

    // Closed unless asked for, and never on the cart page itself
    assert!(!app.page("/").await.contains("quick-cart-title"));
    let body = app.page("/cart?cart=open").await;
    assert!(body.contains("Your cart"));
    assert!(!body.contains("quick-cart-title"));
}

#[tokio::test]
async fn test_quick_cart_posts_return_to_drawer() {
    let app = TestApp::spawn().await;
    app.add_to_cart("S", "1").await;

    let line = [("plant_id", "1"), ("size", "S"), ("next", "/plants/1")];
    let resp = app
        .post("/cart/update", &[line[0], line[1], line[2], ("action", "increase")])
        .await;
    assert_eq!(location(&resp), "/plants/1?cart=open");
    assert!(cart_count(&app).await.contains(">2<"));

    let resp = app.post("/cart/remove", &line).await;
    assert_eq!(location(&resp), "/plants/1?cart=open");
    assert!(cart_count(&app).await.contains(">0<"));

    app.add_to_cart("M", "1").await;
    let resp = app.post("/cart/clear", &[("next", "/")]).await;
    assert_eq!(location(&resp), "/?cart=open");
    assert!(cart_count(&app).await.contains(">0<"));

    // Off-site targets fall back to the home page
    app.add_to_cart("M", "1").await;
    let resp = app.post("/cart/clear", &[("next", "//evil.example")]).await;
    assert_eq!(location(&resp), "/?cart=open");
}

// ============================================================================
// Cart Sync
// ============================================================================

#[tokio::test]
async fn test_login_merges_guest_cart_and_syncs_once() {
    let app = TestApp::spawn().await;
    app.add_to_cart("S", "2").await;

    let resp = app.login().await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    assert!(cart_count(&app).await.contains(">2<"));

    let line = [("plant_id", "1"), ("size", "S"), ("action", "increase")];
    app.post("/cart/update", &line).await;
    app.post("/cart/update", &line).await;

    tokio::time::sleep(SETTLE).await;

    let recorded = app.backend.recorded();
    assert_eq!(recorded.cart_syncs.len(), 1, "{:?}", recorded.cart_syncs);
    let (token, delta) = &recorded.cart_syncs[0];
    assert_eq!(token.as_deref(), Some(TOKEN));
    assert_eq!(
        delta,
        &json!({
            "addedOrUpdatedItems": [{ "id": 1, "size": "S", "quantity": 4 }],
            "deletedItems": []
        })
    );
}

#[tokio::test]
async fn test_remove_after_update_syncs_delete() {
    let app = TestApp::spawn().await;
    app.login().await;

    app.add_to_cart("S", "1").await;
    app.post("/cart/remove", &[("plant_id", "1"), ("size", "S")])
        .await;

    tokio::time::sleep(SETTLE).await;

    let recorded = app.backend.recorded();
    assert_eq!(recorded.cart_syncs.len(), 1);
    assert_eq!(
        recorded.cart_syncs[0].1,
        json!({
            "addedOrUpdatedItems": [],
            "deletedItems": [{ "id": 1, "size": "S" }]
        })
    );
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_checkout_requires_login() {
    let app = TestApp::spawn().await;
    app.add_to_cart("S", "1").await;

    let resp = app.post("/cart/checkout", &[]).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/?auth=login");

    assert_eq!(location(&app.get("/cart/address").await), "/?auth=login");
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let app = TestApp::spawn().await;
    app.login().await;

    let resp = app.post("/cart/checkout", &[]).await;
    assert_eq!(location(&resp), "/cart");
    assert!(app.page("/cart").await.contains("Your cart is empty"));
    assert!(app.backend.recorded().payments.is_empty());
}

#[tokio::test]
async fn test_checkout_flow() {
    let app = TestApp::spawn().await;
    app.login().await;
    app.add_to_cart("S", "1").await;

    // No address yet
    let resp = app.post("/cart/checkout", &[]).await;
    assert_eq!(location(&resp), "/cart/address");

    // Invalid phone re-renders the form
    let mut address = vec![
        ("receiver", "Li Wei"),
        ("phone", "123"),
        ("province", "Yunnan"),
        ("city", "Kunming"),
        ("area", "Wuhua"),
        ("detailAddress", "12 Greenhouse Road"),
    ];
    let resp = app.post("/cart/address", &address).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("form-error"));
    assert!(body.contains("12 Greenhouse Road"));

    address[1] = ("phone", "13800138000");
    let resp = app.post("/cart/address", &address).await;
    assert_eq!(location(&resp), "/cart");
    assert!(app.page("/cart").await.contains("Yunnan Kunming Wuhua 12 Greenhouse Road"));

    let resp = app.post("/cart/checkout", &[]).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "https://pay.example/MY1001");

    {
        let recorded = app.backend.recorded();
        assert_eq!(recorded.payments.len(), 1);
        let payment = &recorded.payments[0];
        assert_eq!(payment["items"], json!([{ "id": 1, "size": "S", "quantity": 1 }]));
        assert_eq!(payment["address"]["detailAddress"], "12 Greenhouse Road");
        assert_eq!(payment["address"]["receiver"], "Li Wei");
    }

    assert!(cart_count(&app).await.contains(">0<"));
    assert!(app.page("/").await.contains("Order MY1001 created"));
}
