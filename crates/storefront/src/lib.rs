//! Roastery Storefront library.
//!
//! This crate provides the storefront service as a library, allowing it to
//! be tested and reused by the operator CLI.
//!
//! # Modules
//!
//! - [`services`] - Cart, checkout, order reconciliation and reviews, generic
//!   over their ports
//! - [`cms`], [`stripe`], [`db`] - Adapters for the CMS, the payment
//!   processor and `PostgreSQL`
//! - [`webhook`] - Signature verification for inbound webhooks
//! - [`routes`], [`middleware`] - The axum HTTP surface

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cms;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod stripe;
pub mod webhook;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
