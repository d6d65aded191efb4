//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Database readiness
//!
//! # Cart (JSON, session-backed)
//! GET  /api/cart               - Cart view with live total
//! POST /api/cart/add           - {productId, quantity, options}
//! POST /api/cart/update        - {key, quantity}
//! POST /api/cart/remove        - {key}
//! POST /api/cart/clear         - Empty the cart
//!
//! # Checkout
//! POST /api/checkout           - Open a hosted payment session from the cart
//! GET  /checkout/success       - Return from payment; clears the cart if paid
//!
//! # Catalog
//! GET  /api/products/{slug}    - Product with approved reviews
//! POST /api/reviews            - Submit a review (5 per hour per address)
//!
//! # Webhooks (signed, not rate limited)
//! POST /api/webhooks/stripe    - Payment events
//! POST /api/webhooks/cms       - Document changes
//! ```

pub mod cart;
pub mod checkout;
pub mod products;
pub mod reviews;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::api_rate_limiter;
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create the webhook routes router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(webhooks::stripe))
        .route("/cms", post(webhooks::cms))
}

/// Shopper-facing JSON API, behind the general rate limiter.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .route("/checkout", post(checkout::create))
        .route("/products/{slug}", get(products::show))
        .route("/reviews", post(reviews::submit))
        .layer(api_rate_limiter())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api", api_routes().nest("/webhooks", webhook_routes()))
        .route("/checkout/success", get(checkout::success))
}
