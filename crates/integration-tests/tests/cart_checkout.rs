//! Integration tests for the cart through to a hosted checkout session.
//!
//! These tests keep a cart in a memory slot, price it against the test
//! catalog and open sessions with the fake payment processor.

#![allow(clippy::unwrap_used)]

use roastery_core::checkout::{ORDER_ITEMS_KEY, PRODUCTS_KEY};
use roastery_core::{Options, ProductId};
use roastery_integration_tests::{BASE_URL, Harness};
use roastery_storefront::services::{CartStore, CheckoutError, CheckoutItem};
use roastery_storefront::testing::{MemorySlot, product, sized_product};
use rust_decimal::Decimal;

fn size(value: &str) -> Options {
    Options::from([("size".to_owned(), value.to_owned())])
}

fn stocked_harness() -> Harness {
    let harness = Harness::new();
    harness.catalog.insert(product("espresso", Decimal::new(1850, 2)));
    harness.catalog.insert(sized_product("tee", Decimal::new(2500, 2)));
    harness
}

async fn checkout_items(slot: &MemorySlot) -> Vec<CheckoutItem> {
    let store = CartStore::load(slot.clone()).await;
    store.cart().lines().iter().map(CheckoutItem::from).collect()
}

// =============================================================================
// Cart
// =============================================================================

#[tokio::test]
async fn test_cart_survives_reload_and_prices_live() {
    let harness = stocked_harness();
    let slot = MemorySlot::default();

    let mut store = CartStore::load(slot.clone()).await;
    store.add(&ProductId::new("espresso"), 2, Options::new()).await;
    store.add(&ProductId::new("tee"), 1, size("M")).await;

    // A new request sees the same cart
    let store = CartStore::load(slot.clone()).await;
    let view = store.view(&harness.catalog).await.unwrap();
    assert_eq!(view.item_count, 3);
    assert_eq!(view.total, Decimal::new(6200, 2));
    assert_eq!(view.formatted_total, "$62.00");

    // Totals follow the catalog, not the price at add time
    harness
        .catalog
        .set_price(&ProductId::new("espresso"), Decimal::new(2000, 2));
    let view = store.view(&harness.catalog).await.unwrap();
    assert_eq!(view.total, Decimal::new(6500, 2));
}

#[tokio::test]
async fn test_same_product_in_two_sizes_is_two_lines() {
    let slot = MemorySlot::default();
    let mut store = CartStore::load(slot.clone()).await;

    store.add(&ProductId::new("tee"), 1, size("S")).await;
    store.add(&ProductId::new("tee"), 1, size("L")).await;
    store.add(&ProductId::new("tee"), 1, size("S")).await;

    let store = CartStore::load(slot).await;
    let quantities: Vec<u32> = store.cart().lines().iter().map(|l| l.quantity()).collect();
    assert_eq!(quantities, vec![2, 1]);
}

#[tokio::test]
async fn test_unavailable_slot_degrades_to_in_memory_cart() {
    let slot = MemorySlot::default();
    slot.set_unavailable(true);

    let mut store = CartStore::load(slot.clone()).await;
    let outcome = store.add(&ProductId::new("espresso"), 1, Options::new()).await;

    assert!(outcome.fully_added);
    assert_eq!(store.item_count(), 1);
    assert_eq!(slot.writes(), 0);
}

#[tokio::test]
async fn test_removed_product_drops_out_of_total() {
    let harness = stocked_harness();
    let slot = MemorySlot::default();

    let mut store = CartStore::load(slot).await;
    store.add(&ProductId::new("espresso"), 1, Options::new()).await;
    store.add(&ProductId::new("discontinued"), 3, Options::new()).await;

    let view = store.view(&harness.catalog).await.unwrap();
    assert_eq!(view.total, Decimal::new(1850, 2));
    let orphan = view
        .items
        .iter()
        .find(|line| line.product_id.as_str() == "discontinued")
        .unwrap();
    assert_eq!(orphan.name, None);
    assert_eq!(orphan.line_total, None);
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_cart_checks_out_with_metadata() {
    let harness = stocked_harness();
    let slot = MemorySlot::default();

    let mut store = CartStore::load(slot.clone()).await;
    store.add(&ProductId::new("espresso"), 2, Options::new()).await;
    store.add(&ProductId::new("tee"), 1, size("L")).await;

    let created = harness
        .checkout
        .create_session(&checkout_items(&slot).await)
        .await
        .unwrap();
    assert_eq!(created.session_id.as_str(), "cs_test_1");
    assert!(created.url.starts_with("https://checkout.test/pay/"));

    let requests = harness.gateway.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.line_items.len(), 2);
    assert_eq!(request.line_items[0].price, "price_espresso");
    assert_eq!(request.line_items[0].quantity, 2);
    assert_eq!(request.allowed_countries, vec!["US".to_owned()]);
    assert!(request.success_url.starts_with(BASE_URL));

    assert_eq!(request.metadata[PRODUCTS_KEY], "espresso x 2, tee x 1 (L)");
    assert!(request.metadata.contains_key(ORDER_ITEMS_KEY));
}

#[tokio::test]
async fn test_checkout_rejects_before_contacting_processor() {
    let harness = stocked_harness();
    let mut missing_price = product("decaf", Decimal::new(1600, 2));
    missing_price.stripe_price_id = None;
    harness.catalog.insert(missing_price);

    let items = vec![
        CheckoutItem {
            product_id: ProductId::new("espresso"),
            quantity: 1,
            options: Options::new(),
        },
        CheckoutItem {
            product_id: ProductId::new("decaf"),
            quantity: 1,
            options: Options::new(),
        },
    ];

    let err = harness.checkout.create_session(&items).await.unwrap_err();
    assert!(matches!(err, CheckoutError::MissingPriceReference(ref id) if id.as_str() == "decaf"));
    assert!(harness.gateway.requests().is_empty());
}

#[tokio::test]
async fn test_empty_cart_cannot_check_out() {
    let harness = stocked_harness();
    let slot = MemorySlot::default();

    let err = harness
        .checkout
        .create_session(&checkout_items(&slot).await)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));
}

#[tokio::test]
async fn test_sold_out_size_cannot_check_out() {
    let harness = stocked_harness();
    let mut tee = sized_product("tee", Decimal::new(2500, 2));
    tee.stock = roastery_core::Stock::ByOption(
        [("S".to_owned(), 0), ("M".to_owned(), 4), ("L".to_owned(), 4)].into(),
    );
    harness.catalog.insert(tee);

    let items = vec![CheckoutItem {
        product_id: ProductId::new("tee"),
        quantity: 1,
        options: size("S"),
    }];

    let err = harness.checkout.create_session(&items).await.unwrap_err();
    assert!(matches!(err, CheckoutError::ProductUnavailable { .. }));
}
