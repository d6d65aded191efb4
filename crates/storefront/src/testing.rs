//! In-memory implementations of every external port.
//!
//! Available to this crate's unit tests and, with the `test-util` feature,
//! to other crates. Each fake is `Clone` and shares its state between clones,
//! so a test can keep a handle while the service under test owns another.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;

use roastery_core::{
    CartSnapshot, CheckoutSessionId, NewOrder, NewReview, Order, OrderId, Product, ProductId,
    Review, ReviewId, Stock,
};

use crate::cms::CmsError;
use crate::config::{CmsConfig, DEFAULT_TRACKING_URL_BASE, EmailConfig, StorefrontConfig, StripeConfig};
use crate::db::RepositoryError;
use crate::services::cart::{SlotError, SnapshotSlot};
use crate::services::catalog::{Catalog, ProductPage};
use crate::services::checkout::PaymentGateway;
use crate::services::email::EmailError;
use crate::services::orders::{InsertOutcome, Mailer, OrderStore, TrackingEmail};
use crate::services::reviews::ReviewStore;
use crate::stripe::{CheckoutSession, CreatedSession, CustomerDetails, PaymentError, SessionRequest};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Fixtures
// =============================================================================

/// A product with flat stock of 10 and price reference `price_<id>`.
#[must_use]
pub fn product(id: &str, price: Decimal) -> Product {
    Product {
        id: ProductId::new(id),
        slug: id.to_owned(),
        name: id.to_owned(),
        price,
        images: vec![format!("https://cdn.test/{id}.jpg")],
        stock: Stock::Flat(10),
        options: BTreeMap::new(),
        is_out_of_stock: false,
        stripe_price_id: Some(format!("price_{id}")),
    }
}

/// Like [`product`], with a required `size` option (S, M, L) and 10 of each.
#[must_use]
pub fn sized_product(id: &str, price: Decimal) -> Product {
    let sizes = ["S", "M", "L"].map(str::to_owned);
    Product {
        options: BTreeMap::from([("size".to_owned(), sizes.to_vec())]),
        stock: Stock::ByOption(sizes.into_iter().map(|size| (size, 10)).collect()),
        ..product(id, price)
    }
}

/// A paid checkout session as the processor would return it.
#[must_use]
pub fn checkout_session(id: &str, name: Option<&str>, email: Option<&str>) -> CheckoutSession {
    CheckoutSession {
        id: CheckoutSessionId::new(id),
        url: None,
        payment_status: Some("paid".to_owned()),
        customer_email: None,
        customer_details: Some(CustomerDetails {
            email: email.map(str::to_owned),
            name: name.map(str::to_owned),
        }),
        metadata: BTreeMap::new(),
        created: Utc::now().timestamp(),
    }
}

/// Complete configuration pointing at unreachable `.test` hosts.
#[must_use]
pub fn storefront_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://localhost/roastery"),
        host: IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "https://shop.roastery.test".to_owned(),
        session_secret: SecretString::from("s".repeat(32)),
        stripe: StripeConfig {
            api_base: "https://api.stripe.com".to_owned(),
            secret_key: SecretString::from("sk_live_Zq8vN2pLr4Tx"),
            webhook_secret: SecretString::from("whsec_Hk3mQ9wPz7"),
            shipping_rate_id: "shr_standard".to_owned(),
            allowed_countries: vec!["US".to_owned()],
        },
        cms: CmsConfig {
            api_base: "https://abc123.api.sanity.io".to_owned(),
            project_id: "abc123".to_owned(),
            dataset: "production".to_owned(),
            api_version: "2024-01-01".to_owned(),
            api_token: SecretString::from("skCmsTokenValue"),
            webhook_secret: SecretString::from("cmsHookValue"),
        },
        email: EmailConfig {
            smtp_host: "smtp.roastery.test".to_owned(),
            smtp_port: 587,
            smtp_username: "mailer".to_owned(),
            smtp_password: SecretString::from("smtpPassValue"),
            from_address: "orders@roastery.test".to_owned(),
        },
        tracking_url_base: DEFAULT_TRACKING_URL_BASE.to_owned(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.1,
    }
}

// =============================================================================
// MemorySlot
// =============================================================================

#[derive(Debug, Default)]
struct SlotState {
    snapshot: Option<CartSnapshot>,
    writes: usize,
    unavailable: bool,
}

/// Cart snapshot slot held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    state: Arc<Mutex<SlotState>>,
}

impl MemorySlot {
    /// The stored snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<CartSnapshot> {
        lock(&self.state).snapshot.clone()
    }

    /// Successful `store` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        lock(&self.state).writes
    }

    /// Make every operation fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    fn check(state: &SlotState) -> Result<(), SlotError> {
        if state.unavailable {
            Err(SlotError("memory slot unavailable".to_owned()))
        } else {
            Ok(())
        }
    }
}

impl SnapshotSlot for MemorySlot {
    async fn load(&self) -> Result<Option<CartSnapshot>, SlotError> {
        let state = lock(&self.state);
        Self::check(&state)?;
        Ok(state.snapshot.clone())
    }

    async fn store(&self, snapshot: &CartSnapshot) -> Result<(), SlotError> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        state.snapshot = Some(snapshot.clone());
        state.writes += 1;
        Ok(())
    }

    async fn erase(&self) -> Result<(), SlotError> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        state.snapshot = None;
        Ok(())
    }
}

// =============================================================================
// TestCatalog
// =============================================================================

#[derive(Debug, Default)]
struct CatalogState {
    products: BTreeMap<ProductId, Product>,
    reviews: HashMap<ProductId, Vec<Review>>,
    unavailable: bool,
}

/// Catalog backed by a map.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl TestCatalog {
    /// Add or replace a product.
    pub fn insert(&self, product: Product) {
        lock(&self.state).products.insert(product.id.clone(), product);
    }

    /// Attach an approved review to a product page.
    pub fn insert_review(&self, product_id: &ProductId, review: Review) {
        lock(&self.state)
            .reviews
            .entry(product_id.clone())
            .or_default()
            .push(review);
    }

    /// Change a product's price in place.
    pub fn set_price(&self, id: &ProductId, price: Decimal) {
        if let Some(product) = lock(&self.state).products.get_mut(id) {
            product.price = price;
        }
    }

    /// Make every query fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }
}

fn catalog_down() -> CmsError {
    CmsError::Status {
        status: 503,
        body: "catalog unavailable".to_owned(),
    }
}

impl Catalog for TestCatalog {
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, CmsError> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(catalog_down());
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<ProductPage>, CmsError> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(catalog_down());
        }
        Ok(state
            .products
            .values()
            .find(|product| product.slug == slug)
            .map(|product| ProductPage {
                product: product.clone(),
                reviews: state.reviews.get(&product.id).cloned().unwrap_or_default(),
            }))
    }
}

// =============================================================================
// FakeGateway
// =============================================================================

#[derive(Debug, Default)]
struct GatewayState {
    requests: Vec<SessionRequest>,
    sessions: HashMap<CheckoutSessionId, CheckoutSession>,
    failing: bool,
}

/// Payment processor that records requests and serves canned sessions.
#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    /// Every session creation request received.
    #[must_use]
    pub fn requests(&self) -> Vec<SessionRequest> {
        lock(&self.state).requests.clone()
    }

    /// Make a session retrievable.
    pub fn insert_session(&self, session: CheckoutSession) {
        lock(&self.state).sessions.insert(session.id.clone(), session);
    }

    /// Make every call fail.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }
}

fn processor_error(message: &str) -> PaymentError {
    PaymentError::Api {
        status: 502,
        message: message.to_owned(),
    }
}

impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CreatedSession, PaymentError> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(processor_error("processor unavailable"));
        }
        state.requests.push(request.clone());

        let session_id = CheckoutSessionId::new(format!("cs_test_{}", state.requests.len()));
        Ok(CreatedSession {
            url: format!("https://checkout.test/pay/{session_id}"),
            session_id,
        })
    }

    async fn retrieve_session(&self, id: &CheckoutSessionId) -> Result<CheckoutSession, PaymentError> {
        let state = lock(&self.state);
        if state.failing {
            return Err(processor_error("processor unavailable"));
        }
        state
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("No such checkout.session: '{id}'"),
            })
    }
}

// =============================================================================
// InMemoryOrderStore
// =============================================================================

#[derive(Debug, Default)]
struct OrderState {
    orders: Vec<Order>,
    fail_mark_sent: bool,
}

/// Order store that keeps orders in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<OrderState>>,
}

impl InMemoryOrderStore {
    /// All orders, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        lock(&self.state).orders.clone()
    }

    #[must_use]
    pub fn order(&self, id: &OrderId) -> Option<Order> {
        lock(&self.state).orders.iter().find(|o| &o.id == id).cloned()
    }

    /// Insert an order as-is, bypassing the idempotency check.
    pub fn seed(&self, order: Order) {
        lock(&self.state).orders.push(order);
    }

    /// Make `mark_tracking_email_sent` fail.
    pub fn fail_mark_sent(&self, fail: bool) {
        lock(&self.state).fail_mark_sent = fail;
    }
}

impl OrderStore for InMemoryOrderStore {
    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        let mut state = lock(&self.state);
        if let Some(existing) = state
            .orders
            .iter()
            .find(|o| o.stripe_session_id == order.stripe_session_id)
        {
            return Ok(InsertOutcome::Existing(existing.id.clone()));
        }

        let id = OrderId::generate();
        state.orders.push(order.clone().into_order(id.clone()));
        Ok(InsertOutcome::Inserted(id))
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.order(id))
    }

    async fn set_tracking_number(
        &self,
        id: &OrderId,
        tracking_number: &str,
    ) -> Result<Order, RepositoryError> {
        let mut state = lock(&self.state);
        let order = state
            .orders
            .iter_mut()
            .find(|o| &o.id == id)
            .ok_or(RepositoryError::NotFound)?;
        order.tracking_number = Some(tracking_number.to_owned());
        Ok(order.clone())
    }

    async fn mark_tracking_email_sent(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        let mut state = lock(&self.state);
        if state.fail_mark_sent {
            return Err(RepositoryError::Conflict("simulated write failure".to_owned()));
        }
        let Some(order) = state.orders.iter_mut().find(|o| &o.id == id) else {
            return Ok(false);
        };
        if order.tracking_email_sent || order.tracking_number().is_none() {
            return Ok(false);
        }
        order.tracking_email_sent = true;
        Ok(true)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let mut orders = self.orders();
        orders.sort_by(|a, b| b.order_timestamp.cmp(&a.order_timestamp));
        orders.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(orders)
    }
}

// =============================================================================
// RecordingMailer
// =============================================================================

#[derive(Debug, Default)]
struct MailerState {
    sent: Vec<TrackingEmail>,
    failing: bool,
    delay: Option<Duration>,
}

/// Mailer that records instead of sending.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    state: Arc<Mutex<MailerState>>,
}

impl RecordingMailer {
    /// Emails delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<TrackingEmail> {
        lock(&self.state).sent.clone()
    }

    /// Make delivery fail.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Hold each delivery for `delay`, like a slow relay.
    pub fn set_delay(&self, delay: Option<Duration>) {
        lock(&self.state).delay = delay;
    }
}

impl Mailer for RecordingMailer {
    async fn send_tracking_email(&self, email: &TrackingEmail) -> Result<(), EmailError> {
        // Always suspend so concurrent callers interleave as with a real relay.
        let delay = lock(&self.state).delay;
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let mut state = lock(&self.state);
        if state.failing {
            return Err(EmailError::InvalidAddress("relay refused".to_owned()));
        }
        state.sent.push(email.clone());
        Ok(())
    }
}

// =============================================================================
// MemoryReviewStore
// =============================================================================

/// Review store that keeps submissions in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryReviewStore {
    reviews: Arc<Mutex<Vec<NewReview>>>,
}

impl MemoryReviewStore {
    #[must_use]
    pub fn reviews(&self) -> Vec<NewReview> {
        lock(&self.reviews).clone()
    }
}

impl ReviewStore for MemoryReviewStore {
    async fn create_review(&self, review: &NewReview) -> Result<ReviewId, CmsError> {
        let mut reviews = lock(&self.reviews);
        reviews.push(review.clone());
        Ok(ReviewId::new(format!("review-{}", reviews.len())))
    }
}
