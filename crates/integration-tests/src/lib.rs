//! Integration tests for the Roastery storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p roastery-integration-tests
//! ```
//!
//! The tests drive the storefront services end to end against the in-memory
//! ports from `roastery_storefront::testing` (enabled by the `test-util`
//! feature), so no database, CMS or payment processor is needed.
//!
//! # Test Categories
//!
//! - `cart_checkout` - Cart to hosted checkout session
//! - `order_lifecycle` - Payment webhook to shipping notification
//! - `reviews` - Review intake and rate limiting
//! - `webhooks` - Signature verification as senders produce it

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::IpAddr;

use roastery_storefront::services::{CheckoutService, CheckoutSettings, OrderReconciler};
use roastery_storefront::testing::{FakeGateway, InMemoryOrderStore, RecordingMailer, TestCatalog};

/// Base URL the checkout return links are built from.
pub const BASE_URL: &str = "https://roastery.test";

/// Carrier link prefix used by the reconciler under test.
pub const TRACKING_URL_BASE: &str = "https://track.test/?n=";

/// Every fake a storefront flow touches, plus the services wired to them.
pub struct Harness {
    pub catalog: TestCatalog,
    pub gateway: FakeGateway,
    pub orders: InMemoryOrderStore,
    pub mailer: RecordingMailer,
    pub checkout: CheckoutService<TestCatalog, FakeGateway>,
    pub reconciler: OrderReconciler<InMemoryOrderStore, RecordingMailer, FakeGateway>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        let catalog = TestCatalog::default();
        let gateway = FakeGateway::default();
        let orders = InMemoryOrderStore::default();
        let mailer = RecordingMailer::default();

        let settings = CheckoutSettings::new(BASE_URL, vec!["US".to_owned()], "shr_test".to_owned());
        let checkout = CheckoutService::new(catalog.clone(), gateway.clone(), settings);
        let reconciler = OrderReconciler::new(
            orders.clone(),
            mailer.clone(),
            gateway.clone(),
            TRACKING_URL_BASE,
        );

        Self {
            catalog,
            gateway,
            orders,
            mailer,
            checkout,
            reconciler,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// A documentation-range client address.
#[must_use]
pub fn client(last_octet: u8) -> IpAddr {
    IpAddr::from([203, 0, 113, last_octet])
}
