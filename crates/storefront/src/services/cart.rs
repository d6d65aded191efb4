//! Session-backed cart store.
//!
//! [`CartStore`] wraps the core [`Cart`] and writes a full snapshot to a
//! [`SnapshotSlot`] after every mutation. Slot failures never reach the
//! caller: they are logged and the store carries on in memory for the rest of
//! the request.

use std::collections::BTreeMap;
use std::future::Future;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tower_sessions::Session;

use roastery_core::types::{format_price, line_total};
use roastery_core::{AddOutcome, Cart, CartSnapshot, LineItemKey, Options, Product, ProductId};

use crate::cms::CmsError;
use crate::services::catalog::{Catalog, current_prices};

/// Session key holding the cart snapshot.
pub const CART_SESSION_KEY: &str = "cart";

/// The durable slot could not be read or written.
#[derive(Debug, Error)]
#[error("cart snapshot slot unavailable: {0}")]
pub struct SlotError(pub String);

/// Durable key-value slot for one shopper's cart snapshot.
pub trait SnapshotSlot: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<Option<CartSnapshot>, SlotError>> + Send;

    fn store(&self, snapshot: &CartSnapshot) -> impl Future<Output = Result<(), SlotError>> + Send;

    fn erase(&self) -> impl Future<Output = Result<(), SlotError>> + Send;
}

impl SnapshotSlot for Session {
    async fn load(&self) -> Result<Option<CartSnapshot>, SlotError> {
        self.get::<CartSnapshot>(CART_SESSION_KEY)
            .await
            .map_err(|e| SlotError(e.to_string()))
    }

    async fn store(&self, snapshot: &CartSnapshot) -> Result<(), SlotError> {
        self.insert(CART_SESSION_KEY, snapshot)
            .await
            .map_err(|e| SlotError(e.to_string()))
    }

    async fn erase(&self) -> Result<(), SlotError> {
        self.remove::<CartSnapshot>(CART_SESSION_KEY)
            .await
            .map(|_| ())
            .map_err(|e| SlotError(e.to_string()))
    }
}

/// A shopper's cart bound to its persistence slot.
pub struct CartStore<S> {
    slot: S,
    cart: Cart,
}

impl<S: SnapshotSlot> CartStore<S> {
    /// Rehydrate from the slot. An unreadable slot yields an empty cart.
    pub async fn load(slot: S) -> Self {
        let cart = match slot.load().await {
            Ok(Some(snapshot)) => Cart::from_snapshot(snapshot),
            Ok(None) => Cart::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read cart snapshot, starting empty");
                Cart::new()
            }
        };
        Self { slot, cart }
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.cart.item_count()
    }

    /// Add units of a selection; see [`Cart::add`] for clamping rules.
    pub async fn add(&mut self, product_id: &ProductId, quantity: i64, options: Options) -> AddOutcome {
        let outcome = self.cart.add(product_id, quantity, options);
        if outcome.added > 0 {
            self.persist().await;
        }
        outcome
    }

    /// Set a line's quantity. Returns the new quantity, `Some(0)` if the line
    /// was removed, or `None` if no line has that key.
    pub async fn update_quantity(&mut self, key: &LineItemKey, quantity: i64) -> Option<u32> {
        let updated = self.cart.update_quantity(key, quantity);
        if updated.is_some() {
            self.persist().await;
        }
        updated
    }

    /// Remove a line. Absent keys are not an error.
    pub async fn remove(&mut self, key: &LineItemKey) -> bool {
        let removed = self.cart.remove(key);
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Empty the cart and erase the stored snapshot.
    pub async fn clear(&mut self) {
        self.cart.clear();
        if let Err(e) = self.slot.erase().await {
            tracing::warn!(error = %e, "Could not erase cart snapshot");
        }
    }

    /// Cart total at current catalog prices.
    ///
    /// # Errors
    ///
    /// Returns [`CmsError`] if prices cannot be fetched.
    pub async fn total<C: Catalog>(&self, catalog: &C) -> Result<Decimal, CmsError> {
        let prices = current_prices(catalog, &self.product_ids()).await?;
        Ok(self.cart.total_with(|id| prices.get(id).copied()))
    }

    /// Cart contents joined with current catalog data.
    ///
    /// # Errors
    ///
    /// Returns [`CmsError`] if products cannot be fetched.
    pub async fn view<C: Catalog>(&self, catalog: &C) -> Result<CartView, CmsError> {
        let ids = self.product_ids();
        let products: BTreeMap<ProductId, Product> = if ids.is_empty() {
            BTreeMap::new()
        } else {
            catalog
                .products_by_ids(&ids)
                .await?
                .into_iter()
                .map(|product| (product.id.clone(), product))
                .collect()
        };

        let items = self
            .cart
            .lines()
            .iter()
            .map(|line| {
                let product = products.get(line.product_id());
                let unit_price = product.map(|p| p.price);
                CartLineView {
                    key: line.key().clone(),
                    product_id: line.product_id().clone(),
                    name: product.map(|p| p.name.clone()),
                    image: product.and_then(|p| p.images.first().cloned()),
                    quantity: line.quantity(),
                    options: line.options().clone(),
                    unit_price,
                    line_total: unit_price.map(|price| line_total(price, line.quantity())),
                }
            })
            .collect();

        let total = self.cart.total_with(|id| products.get(id).map(|p| p.price));
        Ok(CartView {
            items,
            item_count: self.cart.item_count(),
            total,
            formatted_total: format_price(total),
        })
    }

    fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self
            .cart
            .lines()
            .iter()
            .map(|line| line.product_id().clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    async fn persist(&self) {
        if let Err(e) = self.slot.store(&self.cart.snapshot()).await {
            tracing::warn!(error = %e, "Could not persist cart snapshot, continuing in memory");
        }
    }
}

/// One cart line priced at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub key: LineItemKey,
    pub product_id: ProductId,
    /// `None` when the product has left the catalog.
    pub name: Option<String>,
    pub image: Option<String>,
    pub quantity: u32,
    pub options: Options,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
}

/// Cart as returned by the cart API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub item_count: u32,
    pub total: Decimal,
    pub formatted_total: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use roastery_core::make_key;

    use super::*;
    use crate::testing::{MemorySlot, TestCatalog, product};

    fn id(raw: &str) -> ProductId {
        ProductId::new(raw)
    }

    fn size(value: &str) -> Options {
        Options::from([("size".to_owned(), value.to_owned())])
    }

    #[tokio::test]
    async fn test_add_persists_and_reloads() {
        let slot = MemorySlot::default();
        let mut store = CartStore::load(slot.clone()).await;
        store.add(&id("beans"), 2, Options::new()).await;
        store.add(&id("tee"), 1, size("M")).await;

        let reloaded = CartStore::load(slot.clone()).await;
        assert_eq!(reloaded.item_count(), 3);
        assert_eq!(reloaded.cart().lines().len(), 2);
        assert_eq!(slot.writes(), 2);
    }

    #[tokio::test]
    async fn test_add_clamps_and_reports() {
        let mut store = CartStore::load(MemorySlot::default()).await;
        store.add(&id("1"), 3, Options::new()).await;
        let outcome = store.add(&id("1"), 4, Options::new()).await;

        assert_eq!(outcome.quantity, 5);
        assert_eq!(outcome.added, 2);
        assert!(!outcome.fully_added);
    }

    #[tokio::test]
    async fn test_update_to_zero_removes() {
        let mut store = CartStore::load(MemorySlot::default()).await;
        store.add(&id("beans"), 2, Options::new()).await;
        let key = make_key(&id("beans"), &Options::new());

        assert_eq!(store.update_quantity(&key, 0).await, Some(0));
        assert!(store.cart().is_empty());
        assert!(!store.remove(&key).await);
    }

    #[tokio::test]
    async fn test_clear_erases_snapshot() {
        let slot = MemorySlot::default();
        let mut store = CartStore::load(slot.clone()).await;
        store.add(&id("beans"), 1, Options::new()).await;
        assert!(slot.snapshot().is_some());

        store.clear().await;
        assert!(store.cart().is_empty());
        assert!(slot.snapshot().is_none());
        assert!(CartStore::load(slot).await.cart().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_slot_is_fail_soft() {
        let slot = MemorySlot::default();
        slot.set_unavailable(true);

        let mut store = CartStore::load(slot.clone()).await;
        let outcome = store.add(&id("beans"), 2, Options::new()).await;
        assert_eq!(outcome.added, 2);
        assert_eq!(store.item_count(), 2);
        store.clear().await;
        assert!(store.cart().is_empty());
    }

    #[tokio::test]
    async fn test_total_uses_live_prices() {
        let catalog = TestCatalog::default();
        catalog.insert(product("a", Decimal::new(10, 0)));
        catalog.insert(product("b", Decimal::new(20, 0)));

        let mut store = CartStore::load(MemorySlot::default()).await;
        store.add(&id("a"), 1, Options::new()).await;
        store.add(&id("b"), 1, Options::new()).await;
        assert_eq!(store.total(&catalog).await.unwrap(), Decimal::new(30, 0));

        catalog.set_price(&id("a"), Decimal::new(15, 0));
        assert_eq!(store.total(&catalog).await.unwrap(), Decimal::new(35, 0));
    }

    #[tokio::test]
    async fn test_view_marks_missing_products() {
        let catalog = TestCatalog::default();
        catalog.insert(product("a", Decimal::new(1250, 2)));

        let mut store = CartStore::load(MemorySlot::default()).await;
        store.add(&id("a"), 2, Options::new()).await;
        store.add(&id("gone"), 1, Options::new()).await;

        let view = store.view(&catalog).await.unwrap();
        assert_eq!(view.item_count, 3);
        assert_eq!(view.total, Decimal::new(25, 0));
        assert_eq!(view.formatted_total, "$25.00");
        assert_eq!(view.items[0].line_total, Some(Decimal::new(25, 0)));
        assert_eq!(view.items[1].name, None);
    }
}
