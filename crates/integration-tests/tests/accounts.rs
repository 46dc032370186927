//! Login, registration, logout, orders, and expired tokens.

use myrmeco_integration_tests::{PASSWORD, TestApp, location};
use reqwest::StatusCode;

// ============================================================================
// Login & Logout
// ============================================================================

#[tokio::test]
async fn test_login_success() {
    let app = TestApp::spawn().await;

    let resp = app
        .post(
            "/auth/login",
            &[("account", "mei"), ("password", PASSWORD), ("next", "/plants/1")],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/plants/1");

    let body = app.page("/").await;
    assert!(body.contains("Hi, mei"));
    assert!(body.contains("Login successful"));
    assert!(body.contains(r#"href="/orders""#));
}

#[tokio::test]
async fn test_login_failure_reopens_modal_once() {
    let app = TestApp::spawn().await;

    let resp = app
        .post(
            "/auth/login",
            &[("account", "mei"), ("password", "wrong"), ("next", "/plants/1")],
        )
        .await;
    assert_eq!(location(&resp), "/plants/1?auth=login");

    let body = app.page("/plants/1?auth=login").await;
    assert!(body.contains("Invalid account or password"));
    assert!(body.contains(r#"action="/auth/login""#));

    let body = app.page("/plants/1?auth=login").await;
    assert!(!body.contains("Invalid account or password"));
}

#[tokio::test]
async fn test_login_requires_fields() {
    let app = TestApp::spawn().await;

    let resp = app.post("/auth/login", &[("account", " "), ("next", "/")]).await;
    assert_eq!(location(&resp), "/?auth=login");
    assert!(
        app.page("/?auth=login")
            .await
            .contains("Please enter your account and password")
    );
}

#[tokio::test]
async fn test_login_ignores_offsite_next() {
    let app = TestApp::spawn().await;

    let resp = app
        .post(
            "/auth/login",
            &[("account", "mei"), ("password", PASSWORD), ("next", "//evil.example/")],
        )
        .await;
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn test_logout_returns_to_page() {
    let app = TestApp::spawn().await;
    app.login().await;

    let resp = app.post("/auth/logout", &[("next", "/cart")]).await;
    assert_eq!(location(&resp), "/cart");

    let body = app.page("/").await;
    assert!(body.contains("You have been logged out"));
    assert!(!body.contains("Hi, mei"));
}

#[tokio::test]
async fn test_auth_routes_are_rate_limited() {
    let app = TestApp::spawn().await;

    let mut statuses = Vec::new();
    for _ in 0..8 {
        let resp = app
            .post("/auth/login", &[("account", "mei"), ("password", "wrong")])
            .await;
        statuses.push(resp.status());
    }

    assert_eq!(statuses[0], StatusCode::SEE_OTHER);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS), "{statuses:?}");
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::spawn().await;

    let resp = app
        .post(
            "/auth/register",
            &[
                ("username", "mei"),
                ("email", "mei@example.cn"),
                ("password", "12345"),
                ("next", "/"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/?auth=register");
    assert!(
        app.page("/?auth=register")
            .await
            .contains("Password must be at least 6 characters")
    );
}

#[tokio::test]
async fn test_register_backend_rejection() {
    let app = TestApp::spawn().await;

    app.post(
        "/auth/register",
        &[
            ("username", "taken"),
            ("email", "taken@example.cn"),
            ("password", "secret12"),
            ("phone", ""),
            ("next", "/"),
        ],
    )
    .await;
    assert!(
        app.page("/?auth=register")
            .await
            .contains("Username already exists")
    );
}

#[tokio::test]
async fn test_register_success_switches_to_login() {
    let app = TestApp::spawn().await;

    let resp = app
        .post(
            "/auth/register",
            &[
                ("username", "lin"),
                ("email", "lin@example.cn"),
                ("password", "secret12"),
                ("phone", "13912345678"),
                ("next", "/cart"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/cart?auth=login");

    let body = app.page("/cart?auth=login").await;
    assert!(body.contains("Registration successful"));
    assert!(body.contains(r#"action="/auth/login""#));
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
async fn test_orders_require_login() {
    let app = TestApp::spawn().await;

    let resp = app.get("/orders").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/?auth=login");
}

#[tokio::test]
async fn test_orders_page() {
    let app = TestApp::spawn().await;
    app.login().await;

    let resp = app.get("/orders?page=2").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();

    assert_eq!(app.backend.recorded().order_queries, vec![(2, 10)]);

    assert!(body.contains("Page 2 of 3"));
    assert!(body.contains(r#"href="/orders?page=1""#));
    assert!(body.contains(r#"href="/orders?page=3""#));

    // Newest first
    let newer = body.find("MY0999").unwrap();
    let older = body.find("MY0998").unwrap();
    assert!(newer < older);

    assert!(body.contains("2024/05/01 09:05"));
    assert!(body.contains("<s class=\"muted\">¥256.00</s>"));
    assert!(body.contains("¥200.00"));
}

#[tokio::test]
async fn test_expired_token_logs_out() {
    let app = TestApp::spawn().await;
    app.login().await;
    app.backend
        .expire_tokens
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let resp = app.get("/orders").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/?auth=login");

    let body = app.page("/?auth=login").await;
    assert!(body.contains("Your session has expired, please log in again"));
    assert!(!body.contains("Hi, mei"));
    assert!(body.contains(r#"action="/auth/login""#));

    // The visitor stays logged out
    assert_eq!(location(&app.get("/orders").await), "/?auth=login");
}

#[tokio::test]
async fn test_orders_backend_failure_shows_banner() {
    let app = TestApp::spawn().await;
    app.login().await;
    app.backend
        .fail_orders
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let resp = app.get("/orders").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("banner-error"));
    assert!(body.contains("load your orders"));
    assert!(!body.contains("pagination"));

    // Still logged in
    assert!(body.contains("Hi, mei"));
}
