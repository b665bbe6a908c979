//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//!
//! # Products
//! GET  /api/products/{id}      - Product lookup (cached)
//!
//! # Cart
//! GET  /api/cart               - Items, subtotal, item count, auth state
//! POST /api/cart/add           - Add a product {product_id, quantity?}
//! POST /api/cart/update        - Set a line's quantity {key, quantity}
//! POST /api/cart/remove        - Remove a line {key}
//!
//! # Checkout
//! POST /api/checkout           - Place order (or sign-in redirect for guests)
//!
//! # Auth
//! POST /api/auth/login         - Email/password sign-in
//! POST /api/auth/signup        - Create account
//! POST /api/auth/logout        - Sign out
//! GET  /api/auth/me            - Signed-in user (401 for guests)
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/signup", post(auth::signup))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/products/{id}", get(products::show))
        .nest("/api/cart", cart_routes())
        .route("/api/checkout", post(checkout::checkout))
        .nest("/api/auth", auth_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
