//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with `PostgreSQL` store, carries the cart)
//! 5. Rate limiting (governor on `/api`, sliding window on reviews)

pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use rate_limit::{ClientIp, ReviewRateLimiter, api_rate_limiter};
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
