//! Integration tests for the Myrmeco storefront.
//!
//! Every test spins up two servers on ephemeral ports:
//!
//! - a mock plant backend ([`MockBackend`]) that answers the REST endpoints
//!   the storefront calls and records what it was sent
//! - the real storefront router ([`myrmeco_storefront::app`]) pointed at it
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p myrmeco-integration-tests
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use myrmeco_storefront::{app, config::StorefrontConfig, state::AppState};
use reqwest::{Client, redirect::Policy};
use serde::Deserialize;
use serde_json::{Value, json};

/// Password the mock backend accepts for every account.
pub const PASSWORD: &str = "secret1";

/// Bearer token issued by the mock backend on login.
pub const TOKEN: &str = "tok-7";

/// Bytes served for every stored photo.
pub const PHOTO_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nmock";

// =============================================================================
// Mock Backend
// =============================================================================

/// What the mock backend has been asked to do.
#[derive(Debug, Default)]
pub struct Recorded {
    /// Cart deltas pushed to `/api/cart/sync-redis`, with their bearer token.
    pub cart_syncs: Vec<(Option<String>, Value)>,
    /// Bodies sent to `/api/order/create-payment`.
    pub payments: Vec<Value>,
    /// `(page, pageSize)` for each order history request.
    pub order_queries: Vec<(u32, u32)>,
}

/// Shared state of the mock plant backend.
#[derive(Debug, Default)]
pub struct MockBackend {
    base_url: String,
    recorded: Mutex<Recorded>,
    photo_downloads: AtomicUsize,
    /// Reject order history with 401, as if the token expired.
    pub expire_tokens: AtomicBool,
    /// Answer the plant list with a 500.
    pub fail_catalog: AtomicBool,
    /// Answer order history with a 500.
    pub fail_orders: AtomicBool,
}

impl MockBackend {
    /// Lock the recorded calls.
    ///
    /// # Panics
    ///
    /// Panics if a handler panicked while holding the lock.
    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().expect("mock backend state poisoned")
    }

    /// How many times a stored photo was downloaded.
    pub fn photo_downloads(&self) -> usize {
        self.photo_downloads.load(Ordering::SeqCst)
    }

    fn record(&self, f: impl FnOnce(&mut Recorded)) {
        f(&mut self.recorded());
    }
}

type Backend = State<Arc<MockBackend>>;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
}

fn ok<T: serde::Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "message": null, "data": data }))
}

fn plants() -> Value {
    json!([
        {
            "plant_id": 1,
            "name": "Ant plant",
            "latin_name": "Myrmecodia tuberosa",
            "main_img_url": "plants/1.jpg",
            "min_price": 88
        },
        {
            "plant_id": 2,
            "name": "Warty ant plant",
            "latin_name": "Squamellaria imberbis",
            "main_img_url": "plants/2.jpg",
            "min_price": "120.5"
        }
    ])
}

fn stock_for(id: i64, size: &str) -> i64 {
    match (id, size) {
        (1, "S") => 5,
        (1, "M") => 2,
        _ => 0,
    }
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Database unavailable" })),
    )
        .into_response()
}

async fn list_plants(State(backend): Backend) -> Response {
    if backend.fail_catalog.load(Ordering::SeqCst) {
        return server_error();
    }
    ok(plants()).into_response()
}

async fn plant_detail(Path(id): Path<i64>) -> Response {
    if id != 1 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Plant not found" })),
        )
            .into_response();
    }
    ok(json!({
        "plant_id": 1,
        "name": "Ant plant",
        "latin_name": "Myrmecodia tuberosa",
        "main_img_url": "plants/1.jpg",
        "min_price": 88,
        "images": [{ "img_url": "plants/1.jpg" }, { "img_url": "plants/1b.jpg" }],
        "skus": [
            { "size": "S", "price": 88, "stock": stock_for(1, "S") },
            { "size": "M", "price": "128.00", "stock": stock_for(1, "M") },
            { "size": "L", "price": 168, "stock": stock_for(1, "L") }
        ]
    }))
    .into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    account: String,
    password: String,
}

async fn login(Json(body): Json<LoginBody>) -> Response {
    if body.password != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid account or password" })),
        )
            .into_response();
    }
    Json(json!({
        "message": "Login successful",
        "user": { "id": 7, "username": body.account, "email": "mei@example.cn" },
        "token": TOKEN
    }))
    .into_response()
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["username"] == "taken" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Username already exists" })),
        )
            .into_response();
    }
    Json(json!({ "message": "Registration successful" })).into_response()
}

async fn logout() -> Json<Value> {
    Json(json!({ "message": "Logged out" }))
}

#[derive(Deserialize)]
struct StockQuery {
    id: i64,
    size: String,
}

async fn sync_stock(Json(lines): Json<Vec<StockQuery>>) -> Json<Value> {
    let levels: Vec<Value> = lines
        .iter()
        .map(|l| json!({ "id": l.id, "size": l.size, "stock": stock_for(l.id, &l.size) }))
        .collect();
    ok(levels)
}

async fn sync_cart(State(backend): Backend, headers: HeaderMap, Json(delta): Json<Value>) -> Json<Value> {
    backend.record(|r| r.cart_syncs.push((bearer(&headers), delta)));
    ok(Value::Null)
}

async fn create_payment(State(backend): Backend, Json(body): Json<Value>) -> Json<Value> {
    backend.record(|r| r.payments.push(body));
    ok(json!({ "order_sn": "MY1001", "pay_url": "https://pay.example/MY1001" }))
}

async fn get_orders(
    State(backend): Backend,
    Query(query): Query<HashMap<String, u32>>,
) -> Response {
    if backend.expire_tokens.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Token expired" })),
        )
            .into_response();
    }
    if backend.fail_orders.load(Ordering::SeqCst) {
        return server_error();
    }
    let page = query.get("page").copied().unwrap_or(1);
    let page_size = query.get("pageSize").copied().unwrap_or(10);
    backend.record(|r| r.order_queries.push((page, page_size)));

    ok(json!({
        "total": 25,
        "list": [
            {
                "order_sn": "MY0998",
                "order_status": 1,
                "create_time": "2024-04-02 08:30:00",
                "pay_amount": 88,
                "total_amount": 88,
                "order_items": [
                    { "plant_name": "Ant plant", "sku_size": "S", "price": 88, "quantity": 1 }
                ]
            },
            {
                "order_sn": "MY0999",
                "order_status": "2",
                "create_time": "2024-05-01T09:05:00",
                "pay_amount": 200,
                "total_amount": "256",
                "order_items": [
                    { "plant_name": "Ant plant", "sku_size": "M", "price": 128, "quantity": 2 }
                ],
                "main_img_url": "plants/1.jpg"
            }
        ]
    }))
    .into_response()
}

#[derive(Deserialize)]
struct SignQuery {
    #[serde(rename = "imgUrl")]
    img_url: String,
}

async fn sign_image(State(backend): Backend, Query(query): Query<SignQuery>) -> Json<Value> {
    let path = query.img_url.split('?').next().unwrap_or_default();
    Json(json!({ "url": format!("{}/oss/{path}?sig=abc", backend.base_url) }))
}

async fn photo(State(backend): Backend, Path(path): Path<String>) -> Response {
    if path.contains("missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    if path.contains("not-image") {
        backend.photo_downloads.fetch_add(1, Ordering::SeqCst);
        return ([(header::CONTENT_TYPE, "text/html")], "<html>denied</html>").into_response();
    }
    backend.photo_downloads.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "image/png")], PHOTO_BYTES).into_response()
}

fn backend_router(backend: Arc<MockBackend>) -> Router {
    Router::new()
        .route("/api/plants", get(list_plants))
        .route("/api/plant-detail/{id}", get(plant_detail))
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/logout", post(logout))
        .route("/api/cart/sync-stock", post(sync_stock))
        .route("/api/cart/sync-redis", post(sync_cart))
        .route("/api/order/create-payment", post(create_payment))
        .route("/api/order/get-orders", get(get_orders))
        .route("/api/plant-image", get(sign_image))
        .route("/oss/{*path}", get(photo))
        .with_state(backend)
}

async fn bind() -> (tokio::net::TcpListener, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    (listener, addr)
}

// =============================================================================
// Test App
// =============================================================================

/// A running storefront wired to a mock backend.
pub struct TestApp {
    /// Storefront root URL, e.g. `http://127.0.0.1:41234`.
    pub url: String,
    /// Cookie-keeping client that does not follow redirects.
    pub client: Client,
    pub backend: Arc<MockBackend>,
}

impl TestApp {
    /// Start a backend and a storefront with a 200 ms cart sync window.
    pub async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Start with extra configuration variables.
    ///
    /// # Panics
    ///
    /// Panics if a server cannot be started.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Self {
        let (backend_listener, backend_addr) = bind().await;
        let backend = Arc::new(MockBackend {
            base_url: format!("http://{backend_addr}"),
            ..MockBackend::default()
        });
        let router = backend_router(Arc::clone(&backend));
        tokio::spawn(async move {
            axum::serve(backend_listener, router)
                .await
                .expect("Mock backend stopped");
        });

        let cache_path = std::env::temp_dir().join(format!(
            "myrmeco-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let mut vars: HashMap<String, String> = [
            ("STOREFRONT_BASE_URL", "http://127.0.0.1".to_string()),
            ("PLANT_API_BASE_URL", backend.base_url.clone()),
            ("PLANT_API_TIMEOUT_MS", "2000".to_string()),
            ("CART_SYNC_DEBOUNCE_MS", "200".to_string()),
            ("IMAGE_CACHE_PATH", cache_path.display().to_string()),
            (
                "STOREFRONT_STATIC_DIR",
                concat!(env!("CARGO_MANIFEST_DIR"), "/../storefront/static").to_string(),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        for (key, value) in overrides {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = StorefrontConfig::from_lookup(|key| vars.get(key).cloned())
            .expect("Invalid test configuration");
        let state = AppState::new(config).expect("Failed to build app state");

        let (listener, addr) = bind().await;
        tokio::spawn(async move {
            axum::serve(
                listener,
                app(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Storefront stopped");
        });

        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            url: format!("http://{addr}"),
            client,
            backend,
        }
    }

    /// GET a storefront path.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.url))
            .send()
            .await
            .expect("GET failed")
    }

    /// GET a storefront path and return the body.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn page(&self, path: &str) -> String {
        self.get(path).await.text().await.expect("Failed to read body")
    }

    /// POST a form to a storefront path.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn post(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.url))
            .form(form)
            .send()
            .await
            .expect("POST failed")
    }

    /// Log in as `mei`, returning to `/`.
    pub async fn login(&self) -> reqwest::Response {
        self.post(
            "/auth/login",
            &[("account", "mei"), ("password", PASSWORD), ("next", "/")],
        )
        .await
    }

    /// Add `quantity` of plant 1 in `size`.
    pub async fn add_to_cart(&self, size: &str, quantity: &str) -> reqwest::Response {
        self.post(
            "/cart/add",
            &[("plant_id", "1"), ("size", size), ("quantity", quantity)],
        )
        .await
    }
}

/// The `Location` header of a redirect.
///
/// # Panics
///
/// Panics if the response has no `Location`.
pub fn location(response: &reqwest::Response) -> &str {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("Response is not a redirect")
}
