//! Business logic services for storefront.
//!
//! Each service is generic over the ports it drives, so the same code runs
//! against the CMS, the payment processor, SMTP and Postgres in production
//! and against the fakes in [`crate::testing`] in tests.
//!
//! # Services
//!
//! - `catalog` - Read access to products and product pages
//! - `cart` - Session-backed cart store with live pricing
//! - `checkout` - Validates a cart and opens a hosted payment session
//! - `orders` - Payment-to-shipping-notification reconciliation
//! - `email` - SMTP delivery of the shipping notification
//! - `reviews` - Rate-limited review intake

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod orders;
pub mod reviews;

pub use cart::{CartStore, CartView, SnapshotSlot};
pub use catalog::{Catalog, ProductPage};
pub use checkout::{CheckoutError, CheckoutItem, CheckoutService, CheckoutSettings, PaymentGateway};
pub use email::EmailService;
pub use orders::{Mailer, NotifyOutcome, OrderReconciler, OrderStore, ReconcileError, RecordOutcome};
pub use reviews::{ReviewError, ReviewService, ReviewStore};
