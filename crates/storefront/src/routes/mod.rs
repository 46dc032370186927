//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page (plant grid)
//!      ?auth=login|register    - ...with the auth modal open
//! GET  /plants/{id}            - Plant detail (?sku=&image=)
//!
//! # Cart
//! GET  /cart                   - Cart page (refreshes stock)
//! POST /cart/add               - Add a plant
//! POST /cart/update            - Increase, decrease, or set a quantity
//! POST /cart/remove            - Remove a line
//! POST /cart/clear             - Empty the cart
//! GET  /cart/count             - Cart count badge (fragment)
//! GET  /cart/address           - Shipping address form (auth)
//! POST /cart/address           - Save shipping address (auth)
//! POST /cart/checkout          - Create payment (auth)
//!
//! # Orders
//! GET  /orders                 - Order history (auth, ?page=)
//!
//! # Auth (rate limited)
//! POST /auth/login             - Login
//! POST /auth/register          - Register
//! POST /auth/logout            - Logout
//!
//! # Images
//! GET  /images/plant           - Cached plant image (?url=&w=&h=)
//! ```

pub mod auth;
pub mod cart;
pub mod home;
pub mod images;
pub mod layout;
pub mod orders;
pub mod plants;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .layer(auth_rate_limiter())
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/count", get(cart::count))
        .route(
            "/address",
            get(cart::address_form).post(cart::save_address),
        )
        .route("/checkout", post(cart::checkout))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/plants/{id}", get(plants::show))
        .route("/orders", get(orders::index))
        .route("/images/plant", get(images::plant))
        .nest("/cart", cart_routes())
        .nest("/auth", auth_routes())
}
