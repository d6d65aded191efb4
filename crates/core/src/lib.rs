//! Roastery Core - Shared domain library.
//!
//! This crate provides the domain model used by the storefront service and
//! the operator CLI:
//! - `storefront` - Cart API, checkout, webhooks and reviews
//! - `cli` - Migrations and order management
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP clients. Anything that talks to the CMS, the payment
//! processor, SMTP or Postgres lives in the storefront crate.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails and prices
//! - [`product`] - Catalog products and the stock model
//! - [`cart`] - Line-item keys and the cart aggregate
//! - [`checkout`] - Metadata carried through the hosted payment session
//! - [`order`] - Orders and their notification lifecycle
//! - [`review`] - Review submissions and published reviews

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod order;
pub mod product;
pub mod review;
pub mod types;

pub use cart::{AddOutcome, Cart, CartSnapshot, LineItem, LineItemKey, MAX_QUANTITY_PER_ORDER, Options, make_key};
pub use order::{NewOrder, Order, OrderItem, OrderStage};
pub use product::{OptionSchema, Product, Stock};
pub use review::{NewReview, Rating, Review, ReviewSubmission};
pub use types::*;
