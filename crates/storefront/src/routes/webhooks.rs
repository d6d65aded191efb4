//! Inbound webhook handlers.
//!
//! Both endpoints verify the signature over the raw body before parsing it.
//! Published product and review changes from the CMS also drop the cached
//! product pages so approvals show up without waiting for expiry.
//! Anything the storefront does not act on is acknowledged with 200 so the
//! sender stops retrying; failures worth retrying return 5xx.
//!
//! Orders live in `PostgreSQL`, not in the CMS. An `order` change only
//! reaches the reconciler when its `_id` is a storefront order id, which is
//! what `roastery orders track --notify` sends. Order documents the CMS
//! holds itself carry ids the storefront never minted; those are
//! acknowledged as `unknown_order` rather than retried.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use roastery_core::OrderId;

use crate::error::{AppError, Result};
use crate::services::orders::{CompletedCheckout, NotifyOutcome, ReconcileError, RecordOutcome};
use crate::state::AppState;
use crate::stripe::{CHECKOUT_SESSION_COMPLETED, CheckoutSession, StripeEvent};
use crate::webhook::{CMS_SIGNATURE_HEADER, STRIPE_SIGNATURE_HEADER};

/// CMS document type that drives shipping notifications.
const ORDER_DOCUMENT_TYPE: &str = "order";

/// Document types shown on cached product pages.
const PAGE_DOCUMENT_TYPES: [&str; 2] = ["product", "review"];

/// Prefix the CMS puts on unpublished document ids.
const DRAFT_PREFIX: &str = "drafts.";

/// Acknowledgement body.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Ack {
    pub received: bool,
    pub outcome: String,
}

impl Ack {
    fn new(outcome: impl Into<String>) -> Json<Self> {
        Json(Self {
            received: true,
            outcome: outcome.into(),
        })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// =============================================================================
// Payment processor
// =============================================================================

/// Payment processor events.
#[instrument(skip(state, headers, body))]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>> {
    state
        .stripe_webhooks()
        .verify(header(&headers, STRIPE_SIGNATURE_HEADER), &body)
        .inspect_err(|e| tracing::warn!(error = %e, "Rejected payment webhook"))?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed event: {e}")))?;
    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Payment webhook received");

    if event.event_type != CHECKOUT_SESSION_COMPLETED {
        return Ok(Ack::new("ignored"));
    }

    let session: CheckoutSession = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::BadRequest(format!("malformed checkout session: {e}")))?;

    let outcome = match state
        .reconciler()
        .record_payment(&CompletedCheckout::from(&session))
        .await?
    {
        RecordOutcome::Created(_) => "order_created",
        RecordOutcome::Duplicate(_) => "duplicate",
    };
    Ok(Ack::new(outcome))
}

// =============================================================================
// CMS
// =============================================================================

/// Changed-document notification from the CMS.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DocumentChange {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type")]
    pub kind: String,
}

impl DocumentChange {
    fn is_draft(&self) -> bool {
        self.id.starts_with(DRAFT_PREFIX)
    }

    /// The order this change is about, if it is a published order.
    fn order_id(&self) -> Option<OrderId> {
        (self.kind == ORDER_DOCUMENT_TYPE && !self.is_draft()).then(|| OrderId::new(self.id.as_str()))
    }

    /// Whether cached product pages may now be stale.
    fn affects_pages(&self) -> bool {
        PAGE_DOCUMENT_TYPES.contains(&self.kind.as_str()) && !self.is_draft()
    }
}

/// CMS document changes.
#[instrument(skip(state, headers, body))]
pub async fn cms(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>> {
    state
        .cms_webhooks()
        .verify(header(&headers, CMS_SIGNATURE_HEADER), &body)
        .inspect_err(|e| tracing::warn!(error = %e, "Rejected CMS webhook"))?;

    let change: DocumentChange = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed document payload: {e}")))?;
    tracing::info!(document_id = %change.id, document_type = %change.kind, "CMS webhook received");

    if change.affects_pages() {
        state.catalog().invalidate_pages();
        return Ok(Ack::new("cache_invalidated"));
    }

    let Some(order_id) = change.order_id() else {
        return Ok(Ack::new("ignored"));
    };

    let outcome = notify_outcome(state.reconciler().notify_tracking(&order_id).await)?;
    Ok(Ack::new(outcome))
}

/// Ack outcome for a notification attempt. Unknown orders are not retryable.
fn notify_outcome(
    result: std::result::Result<NotifyOutcome, ReconcileError>,
) -> std::result::Result<String, ReconcileError> {
    match result {
        Ok(NotifyOutcome::Sent) => Ok("sent".to_owned()),
        Ok(NotifyOutcome::Skipped(reason)) => Ok(format!("skipped_{reason}")),
        Err(ReconcileError::OrderNotFound(id)) => {
            tracing::warn!(order_id = %id, "Order change for an order the storefront does not hold");
            Ok("unknown_order".to_owned())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::orders::SkipReason;

    fn change(id: &str, kind: &str) -> DocumentChange {
        serde_json::from_value(serde_json::json!({"_id": id, "_type": kind, "_rev": "x"})).unwrap()
    }

    #[test]
    fn test_order_changes_are_acted_on() {
        assert_eq!(change("order-7", "order").order_id(), Some(OrderId::new("order-7")));
    }

    #[test]
    fn test_other_documents_are_ignored() {
        assert_eq!(change("p-1", "product").order_id(), None);
        assert_eq!(change("drafts.order-7", "order").order_id(), None);
    }

    #[test]
    fn test_unknown_order_is_acknowledged() {
        let outcome = notify_outcome(Err(ReconcileError::OrderNotFound(OrderId::new("cms-order-1"))));
        assert_eq!(outcome.unwrap(), "unknown_order");

        let outcome = notify_outcome(Ok(NotifyOutcome::Skipped(SkipReason::AlreadySent)));
        assert_eq!(outcome.unwrap(), "skipped_already_sent");

        let err = notify_outcome(Err(ReconcileError::MissingCustomerEmail)).unwrap_err();
        assert_eq!(err.kind(), "missing_customer_email");
    }

    #[test]
    fn test_published_catalog_changes_invalidate_pages() {
        assert!(change("p-1", "product").affects_pages());
        assert!(change("r-9", "review").affects_pages());
        assert!(!change("drafts.p-1", "product").affects_pages());
        assert!(!change("order-7", "order").affects_pages());
    }
}
