//! Order reconciliation.
//!
//! Two asynchronous events drive an order:
//!
//! 1. **Payment completed** ([`OrderReconciler::record_payment`]) creates the
//!    order. The payment session id is the idempotency key, so redelivery of
//!    the same event finds the existing order and does nothing.
//! 2. **Order updated** ([`OrderReconciler::notify_tracking`]) sends the
//!    shipping notification once a tracking number is attached, then sets
//!    `tracking_email_sent`. An order with the flag set is never emailed
//!    again.
//!
//! # Send ledger
//!
//! Sending and flagging are two writes to two systems. An in-process ledger
//! keyed by (order, tracking number) claims a send before the email goes out
//! and remembers it for a day once it has. That gives two guarantees the flag
//! alone cannot:
//!
//! - concurrent deliveries of the same update see the claim and skip
//! - if the flag write fails after a successful send, the retry only repeats
//!   the flag write
//!
//! A claim is released when the send fails or the delivery is dropped before
//! the mailer returns, so a redelivery can send again.
//!
//! The ledger does not survive a restart. A flag-write failure followed by a
//! restart before the retry can still send a second email; that case is
//! reported to Sentry when the write fails.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use thiserror::Error;
use tracing::instrument;

use roastery_core::checkout::CheckoutMetadata;
use roastery_core::{CheckoutSessionId, Email, NewOrder, Order, OrderId};

use crate::db::RepositoryError;
use crate::services::checkout::PaymentGateway;
use crate::services::email::EmailError;
use crate::stripe::CheckoutSession;

/// How long a completed send is remembered.
const LEDGER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on remembered sends.
const LEDGER_CAPACITY: u64 = 10_000;

// =============================================================================
// Ports
// =============================================================================

/// Result of inserting an order keyed by payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(OrderId),
    /// An order for the session already existed.
    Existing(OrderId),
}

/// Durable order records.
pub trait OrderStore: Send + Sync {
    /// Insert unless an order for the same payment session exists.
    fn insert_if_absent(
        &self,
        order: &NewOrder,
    ) -> impl Future<Output = Result<InsertOutcome, RepositoryError>> + Send;

    fn get(&self, id: &OrderId) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// Attach a tracking number. Fails with [`RepositoryError::NotFound`]
    /// for unknown orders.
    fn set_tracking_number(
        &self,
        id: &OrderId,
        tracking_number: &str,
    ) -> impl Future<Output = Result<Order, RepositoryError>> + Send;

    /// Flip `tracking_email_sent` to true if it is false and a tracking
    /// number is present. Returns whether this call flipped it.
    fn mark_tracking_email_sent(
        &self,
        id: &OrderId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Most recent orders first.
    fn list_recent(&self, limit: i64) -> impl Future<Output = Result<Vec<Order>, RepositoryError>> + Send;
}

/// A shipping notification ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingEmail {
    pub to: Email,
    pub first_name: Option<String>,
    pub order_id: OrderId,
    pub tracking_number: String,
    pub tracking_url: String,
    pub product_summary: String,
}

/// Outbound transactional mail.
pub trait Mailer: Send + Sync {
    fn send_tracking_email(
        &self,
        email: &TrackingEmail,
    ) -> impl Future<Output = Result<(), EmailError>> + Send;
}

// =============================================================================
// Events and outcomes
// =============================================================================

/// The parts of a completed checkout session an order is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub session_id: CheckoutSessionId,
    pub customer_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub completed_at: DateTime<Utc>,
}

impl From<&CheckoutSession> for CompletedCheckout {
    fn from(session: &CheckoutSession) -> Self {
        Self {
            session_id: session.id.clone(),
            customer_email: session.customer_email().map(str::to_owned),
            metadata: session.metadata.clone(),
            completed_at: session.created_at(),
        }
    }
}

impl CompletedCheckout {
    /// Build the order to insert.
    ///
    /// Structured items from metadata are preferred; otherwise the human
    /// summary is kept as legacy text.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MissingCustomerEmail`] or
    /// [`ReconcileError::InvalidCustomerEmail`].
    pub fn to_new_order(&self) -> Result<NewOrder, ReconcileError> {
        let raw_email = self
            .customer_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or(ReconcileError::MissingCustomerEmail)?;
        let customer_email = Email::parse(raw_email)?;

        let metadata = CheckoutMetadata::from_map(&self.metadata);
        let order_items = metadata
            .as_ref()
            .and_then(CheckoutMetadata::decoded_items)
            .unwrap_or_default();
        let legacy_products = if order_items.is_empty() {
            metadata
                .map(|m| m.products)
                .filter(|products| !products.trim().is_empty())
        } else {
            None
        };

        Ok(NewOrder {
            customer_email,
            order_items,
            legacy_products,
            stripe_session_id: self.session_id.clone(),
            order_timestamp: self.completed_at,
        })
    }
}

/// Result of [`OrderReconciler::record_payment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Created(OrderId),
    /// Redelivery of an already recorded payment.
    Duplicate(OrderId),
}

/// Why no email was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoTrackingNumber,
    AlreadySent,
    /// Another delivery of the same update is sending right now.
    InFlight,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTrackingNumber => write!(f, "no_tracking_number"),
            Self::AlreadySent => write!(f, "already_sent"),
            Self::InFlight => write!(f, "in_flight"),
        }
    }
}

/// Result of [`OrderReconciler::notify_tracking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Skipped(SkipReason),
}

/// Reconciliation failures.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("customer email is missing")]
    MissingCustomerEmail,

    #[error("customer email is invalid: {0}")]
    InvalidCustomerEmail(#[from] roastery_core::EmailError),

    #[error("order store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("email delivery failed: {0}")]
    Email(#[from] EmailError),

    /// The email went out but the flag could not be recorded.
    #[error("tracking email sent but not recorded: {0}")]
    MarkSentFailed(#[source] RepositoryError),
}

impl ReconcileError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "order_not_found",
            Self::MissingCustomerEmail => "missing_customer_email",
            Self::InvalidCustomerEmail(_) => "invalid_customer_email",
            Self::Store(_) => "order_store_error",
            Self::Email(_) => "email_failed",
            Self::MarkSentFailed(_) => "mark_sent_failed",
        }
    }
}

// =============================================================================
// OrderReconciler
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendState {
    InFlight,
    Sent,
}

type LedgerKey = (OrderId, String);

/// An in-flight claim on the send ledger.
///
/// Dropped without [`SendClaim::complete`], the claim is released.
struct SendClaim<'a> {
    ledger: &'a Cache<LedgerKey, SendState>,
    key: Option<LedgerKey>,
}

impl SendClaim<'_> {
    /// Record the email as delivered.
    fn complete(mut self) {
        if let Some(key) = self.key.take() {
            self.ledger.insert(key, SendState::Sent);
        }
    }
}

impl Drop for SendClaim<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.ledger.invalidate(&key);
        }
    }
}

/// Carrier deep link for a tracking number.
#[must_use]
pub fn tracking_url(base: &str, tracking_number: &str) -> String {
    format!("{base}{}", urlencoding::encode(tracking_number))
}

/// Drives orders from payment to shipping notification.
pub struct OrderReconciler<S, M, P> {
    store: S,
    mailer: M,
    gateway: P,
    tracking_url_base: String,
    ledger: Cache<LedgerKey, SendState>,
}

impl<S: OrderStore, M: Mailer, P: PaymentGateway> OrderReconciler<S, M, P> {
    pub fn new(store: S, mailer: M, gateway: P, tracking_url_base: impl Into<String>) -> Self {
        let ledger = Cache::builder()
            .max_capacity(LEDGER_CAPACITY)
            .time_to_live(LEDGER_TTL)
            .build();

        Self {
            store,
            mailer,
            gateway,
            tracking_url_base: tracking_url_base.into(),
            ledger,
        }
    }

    /// The underlying order store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Create the order for a completed payment, once.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MissingCustomerEmail`] when the session has
    /// no usable email, or [`ReconcileError::Store`] on database failure.
    #[instrument(skip(self, checkout), fields(session_id = %checkout.session_id))]
    pub async fn record_payment(&self, checkout: &CompletedCheckout) -> Result<RecordOutcome, ReconcileError> {
        let order = checkout.to_new_order()?;

        match self.store.insert_if_absent(&order).await? {
            InsertOutcome::Inserted(id) => {
                tracing::info!(order_id = %id, items = order.order_items.len(), "Order created");
                Ok(RecordOutcome::Created(id))
            }
            InsertOutcome::Existing(id) => {
                tracing::info!(order_id = %id, "Payment already recorded, ignoring redelivery");
                Ok(RecordOutcome::Duplicate(id))
            }
        }
    }

    /// Send the shipping notification for an order, at most once.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::OrderNotFound`] for unknown ids
    /// - [`ReconcileError::MissingCustomerEmail`] when there is nobody to email
    /// - [`ReconcileError::Email`] when delivery fails (nothing recorded)
    /// - [`ReconcileError::MarkSentFailed`] when delivery succeeded but the
    ///   flag write did not; retrying only retries the write
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn notify_tracking(&self, id: &OrderId) -> Result<NotifyOutcome, ReconcileError> {
        let order = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound(id.clone()))?;

        if order.tracking_email_sent {
            tracing::debug!("Tracking email already sent");
            return Ok(NotifyOutcome::Skipped(SkipReason::AlreadySent));
        }

        let Some(tracking_number) = order.tracking_number() else {
            tracing::debug!("No tracking number yet");
            return Ok(NotifyOutcome::Skipped(SkipReason::NoTrackingNumber));
        };

        let Some(to) = order.customer_email.clone() else {
            tracing::warn!("Order has a tracking number but no customer email");
            return Err(ReconcileError::MissingCustomerEmail);
        };

        let key: LedgerKey = (order.id.clone(), tracking_number.to_owned());
        let entry = self.ledger.entry(key.clone()).or_insert(SendState::InFlight);
        if !entry.is_fresh() {
            return match entry.into_value() {
                SendState::InFlight => {
                    tracing::info!("Another delivery is sending this notification");
                    Ok(NotifyOutcome::Skipped(SkipReason::InFlight))
                }
                SendState::Sent => {
                    tracing::info!("Email already delivered, retrying flag write only");
                    self.mark_sent(&order.id).await?;
                    Ok(NotifyOutcome::Skipped(SkipReason::AlreadySent))
                }
            };
        }

        let claim = SendClaim {
            ledger: &self.ledger,
            key: Some(key),
        };

        let email = TrackingEmail {
            to,
            first_name: self.first_name(&order.stripe_session_id).await,
            order_id: order.id.clone(),
            tracking_number: tracking_number.to_owned(),
            tracking_url: tracking_url(&self.tracking_url_base, tracking_number),
            product_summary: order.product_summary(),
        };

        if let Err(e) = self.mailer.send_tracking_email(&email).await {
            drop(claim);
            tracing::error!(error = %e, "Tracking email failed");
            return Err(e.into());
        }
        claim.complete();

        self.mark_sent(&order.id).await?;
        tracing::info!(tracking_number = %tracking_number, "Tracking email sent");
        Ok(NotifyOutcome::Sent)
    }

    async fn mark_sent(&self, id: &OrderId) -> Result<(), ReconcileError> {
        match self.store.mark_tracking_email_sent(id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(order_id = %id, "Tracking email flag was already set");
                Ok(())
            }
            Err(e) => {
                let event_id = sentry::capture_error(&e);
                tracing::error!(
                    order_id = %id,
                    error = %e,
                    sentry_event_id = %event_id,
                    "Tracking email sent but flag write failed"
                );
                Err(ReconcileError::MarkSentFailed(e))
            }
        }
    }

    /// Best-effort first name from the originating payment session.
    async fn first_name(&self, session_id: &CheckoutSessionId) -> Option<String> {
        match self.gateway.retrieve_session(session_id).await {
            Ok(session) => session.customer_first_name(),
            Err(e) => {
                tracing::debug!(error = %e, "Could not resolve customer name, using generic greeting");
                None
            }
        }
    }
}
