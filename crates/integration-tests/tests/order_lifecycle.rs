//! Integration tests for orders from payment to shipping notification.
//!
//! A checkout session is opened from the cart, completed by the fake
//! processor, recorded as an order and then notified once a tracking number
//! is attached.

#![allow(clippy::unwrap_used)]

use roastery_core::{Options, OrderId, OrderStage, ProductId};
use roastery_integration_tests::{Harness, TRACKING_URL_BASE};
use roastery_storefront::services::orders::{CompletedCheckout, SkipReason};
use roastery_storefront::services::{CheckoutItem, NotifyOutcome, OrderStore, ReconcileError, RecordOutcome};
use roastery_storefront::testing::{checkout_session, product};
use rust_decimal::Decimal;

const CUSTOMER: &str = "ada@example.com";

/// Open a session for two bags of espresso and complete it.
async fn paid_order(harness: &Harness) -> OrderId {
    harness.catalog.insert(product("espresso", Decimal::new(1850, 2)));
    let created = harness
        .checkout
        .create_session(&[CheckoutItem {
            product_id: ProductId::new("espresso"),
            quantity: 2,
            options: Options::new(),
        }])
        .await
        .unwrap();

    let mut session = checkout_session(created.session_id.as_str(), Some("Ada Lovelace"), Some(CUSTOMER));
    session.metadata = harness.gateway.requests()[0].metadata.clone();
    harness.gateway.insert_session(session.clone());

    match harness
        .reconciler
        .record_payment(&CompletedCheckout::from(&session))
        .await
        .unwrap()
    {
        RecordOutcome::Created(id) => id,
        RecordOutcome::Duplicate(id) => panic!("first delivery reported duplicate {id}"),
    }
}

// =============================================================================
// Payment
// =============================================================================

#[tokio::test]
async fn test_completed_payment_creates_structured_order() {
    let harness = Harness::new();
    let id = paid_order(&harness).await;

    let order = harness.orders.order(&id).unwrap();
    assert_eq!(order.customer_email.unwrap().as_str(), CUSTOMER);
    assert_eq!(order.order_items.len(), 1);
    assert_eq!(order.order_items[0].quantity, 2);
    assert_eq!(order.legacy_products, None);
    assert_eq!(order.stripe_session_id.as_str(), "cs_test_1");
    assert_eq!(order.tracking_number, None);
    assert!(!order.tracking_email_sent);
}

#[tokio::test]
async fn test_redelivered_payment_is_recorded_once() {
    let harness = Harness::new();
    let id = paid_order(&harness).await;

    let session = harness
        .checkout
        .retrieve_session(&harness.orders.order(&id).unwrap().stripe_session_id)
        .await
        .unwrap();
    for _ in 0..3 {
        let outcome = harness
            .reconciler
            .record_payment(&CompletedCheckout::from(&session))
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Duplicate(id.clone()));
    }

    assert_eq!(harness.orders.orders().len(), 1);
}

#[tokio::test]
async fn test_payment_without_email_is_rejected() {
    let harness = Harness::new();
    let session = checkout_session("cs_anon", None, None);

    let err = harness
        .reconciler
        .record_payment(&CompletedCheckout::from(&session))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MissingCustomerEmail));
    assert!(harness.orders.orders().is_empty());
}

// =============================================================================
// Shipping notification
// =============================================================================

#[tokio::test]
async fn test_tracking_number_triggers_one_email() {
    let harness = Harness::new();
    let id = paid_order(&harness).await;

    // Nothing to send before a tracking number is attached
    assert_eq!(
        harness.reconciler.notify_tracking(&id).await.unwrap(),
        NotifyOutcome::Skipped(SkipReason::NoTrackingNumber)
    );

    harness.orders.set_tracking_number(&id, "1Z 999").await.unwrap();
    assert_eq!(
        harness.reconciler.notify_tracking(&id).await.unwrap(),
        NotifyOutcome::Sent
    );
    assert_eq!(
        harness.reconciler.notify_tracking(&id).await.unwrap(),
        NotifyOutcome::Skipped(SkipReason::AlreadySent)
    );

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    let email = &sent[0];
    assert_eq!(email.to.as_str(), CUSTOMER);
    assert_eq!(email.first_name.as_deref(), Some("Ada"));
    assert_eq!(email.tracking_url, format!("{TRACKING_URL_BASE}1Z%20999"));
    assert_eq!(email.product_summary, "2 x espresso");

    let order = harness.orders.order(&id).unwrap();
    assert_eq!(order.stage(), OrderStage::Notified);
}

#[tokio::test]
async fn test_concurrent_updates_send_once() {
    let harness = Harness::new();
    let id = paid_order(&harness).await;
    harness.orders.set_tracking_number(&id, "1Z999").await.unwrap();

    let (first, second) = tokio::join!(
        harness.reconciler.notify_tracking(&id),
        harness.reconciler.notify_tracking(&id),
    );
    let mut outcomes = [first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| matches!(outcome, NotifyOutcome::Skipped(_)));

    assert_eq!(outcomes[0], NotifyOutcome::Sent);
    assert!(matches!(outcomes[1], NotifyOutcome::Skipped(_)));
    assert_eq!(harness.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_is_retried() {
    let harness = Harness::new();
    let id = paid_order(&harness).await;
    harness.orders.set_tracking_number(&id, "1Z999").await.unwrap();

    harness.mailer.set_failing(true);
    let err = harness.reconciler.notify_tracking(&id).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Email(_)));
    assert!(!harness.orders.order(&id).unwrap().tracking_email_sent);

    harness.mailer.set_failing(false);
    assert_eq!(
        harness.reconciler.notify_tracking(&id).await.unwrap(),
        NotifyOutcome::Sent
    );
    assert_eq!(harness.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_flag_write_does_not_resend() {
    let harness = Harness::new();
    let id = paid_order(&harness).await;
    harness.orders.set_tracking_number(&id, "1Z999").await.unwrap();

    harness.orders.fail_mark_sent(true);
    let err = harness.reconciler.notify_tracking(&id).await.unwrap_err();
    assert!(matches!(err, ReconcileError::MarkSentFailed(_)));
    assert_eq!(harness.mailer.sent().len(), 1);

    // The sender retries; only the flag write is repeated
    harness.orders.fail_mark_sent(false);
    assert_eq!(
        harness.reconciler.notify_tracking(&id).await.unwrap(),
        NotifyOutcome::Skipped(SkipReason::AlreadySent)
    );
    assert_eq!(harness.mailer.sent().len(), 1);
    assert!(harness.orders.order(&id).unwrap().tracking_email_sent);
}

#[tokio::test]
async fn test_unknown_order_is_reported() {
    let harness = Harness::new();
    let err = harness
        .reconciler
        .notify_tracking(&OrderId::new("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::OrderNotFound(_)));
}

#[tokio::test]
async fn test_recent_orders_are_newest_first() {
    let harness = Harness::new();
    let first = paid_order(&harness).await;

    let mut later = checkout_session("cs_later", None, Some("grace@example.com"));
    later.created += 60;
    harness
        .reconciler
        .record_payment(&CompletedCheckout::from(&later))
        .await
        .unwrap();

    let recent = harness.orders.list_recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[1].id, first);
    assert_eq!(recent[0].stripe_session_id.as_str(), "cs_later");
}
