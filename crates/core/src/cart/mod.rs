//! Shopping cart aggregate.
//!
//! The cart is a list of line items in insertion order. It enforces two
//! invariants on every mutation:
//!
//! - no two line items share a [`LineItemKey`]
//! - every quantity is within `1..=MAX_QUANTITY_PER_ORDER`
//!
//! Prices are deliberately not stored on line items. [`Cart::total_with`]
//! asks for the current catalog price at read time ("live pricing"), so a
//! price change in the CMS shows up in an existing cart without any cart
//! mutation.
//!
//! Persistence lives outside this crate; the cart only knows how to turn
//! itself into a [`CartSnapshot`] and back.

mod key;

pub use key::{LineItemKey, Options, make_key};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ProductId, line_total};

/// Most units of a single line item one order may contain.
pub const MAX_QUANTITY_PER_ORDER: u32 = 5;

/// One (product, option selection, quantity) entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    key: LineItemKey,
    product_id: ProductId,
    quantity: u32,
    options: Options,
}

impl LineItem {
    fn new(product_id: ProductId, quantity: u32, options: Options) -> Self {
        Self {
            key: make_key(&product_id, &options),
            product_id,
            quantity,
            options,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &LineItemKey {
        &self.key
    }

    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }
}

/// Result of [`Cart::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    /// Units the caller asked for (negative requests count as zero).
    pub requested: u32,
    /// Units actually added after clamping.
    pub added: u32,
    /// Line quantity after the operation (0 if nothing exists for the key).
    pub quantity: u32,
    /// Whether every requested unit was added.
    pub fully_added: bool,
}

/// Serialized form of a cart, as written to the session slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub version: u32,
    pub items: Vec<SnapshotItem>,
}

impl CartSnapshot {
    /// Snapshot format version written by this build.
    pub const CURRENT_VERSION: u32 = 1;
}

/// One line item inside a [`CartSnapshot`]. Keys are not stored; they are
/// recomputed on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub options: Options,
}

/// The shopper's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[LineItem] {
        &self.items
    }

    /// Look up a line item by key.
    #[must_use]
    pub fn get(&self, key: &LineItemKey) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.key == key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add units of a product selection.
    ///
    /// A non-positive quantity is a no-op. Otherwise the line for the
    /// selection is created or grown, clamped to [`MAX_QUANTITY_PER_ORDER`].
    pub fn add(&mut self, product_id: &ProductId, quantity: i64, options: Options) -> AddOutcome {
        let requested = u32::try_from(quantity.max(0)).unwrap_or(u32::MAX);
        let key = make_key(product_id, &options);

        if requested == 0 {
            return AddOutcome {
                requested,
                added: 0,
                quantity: self.get(&key).map_or(0, LineItem::quantity),
                fully_added: false,
            };
        }

        let (added, quantity) = if let Some(item) = self.items.iter_mut().find(|i| i.key == key) {
            let room = MAX_QUANTITY_PER_ORDER.saturating_sub(item.quantity);
            let added = requested.min(room);
            item.quantity += added;
            (added, item.quantity)
        } else {
            let added = requested.min(MAX_QUANTITY_PER_ORDER);
            self.items
                .push(LineItem::new(product_id.clone(), added, options));
            (added, added)
        };

        AddOutcome {
            requested,
            added,
            quantity,
            fully_added: added == requested,
        }
    }

    /// Set a line's quantity, clamped into `0..=MAX_QUANTITY_PER_ORDER`.
    ///
    /// Zero removes the line. Returns the resulting quantity, or `None` if no
    /// line has that key.
    pub fn update_quantity(&mut self, key: &LineItemKey, quantity: i64) -> Option<u32> {
        let clamped = u32::try_from(quantity.clamp(0, i64::from(MAX_QUANTITY_PER_ORDER)))
            .unwrap_or(0);
        let position = self.items.iter().position(|item| &item.key == key)?;

        if clamped == 0 {
            self.items.remove(position);
        } else if let Some(item) = self.items.get_mut(position) {
            item.quantity = clamped;
        }

        Some(clamped)
    }

    /// Remove a line. Removing an absent key is not an error.
    pub fn remove(&mut self, key: &LineItemKey) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.key != key);
        self.items.len() != before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Sum of `price * quantity` using prices looked up now.
    ///
    /// Lines whose product no longer resolves contribute nothing.
    pub fn total_with<F>(&self, mut price_of: F) -> Decimal
    where
        F: FnMut(&ProductId) -> Option<Decimal>,
    {
        self.items
            .iter()
            .filter_map(|item| {
                price_of(&item.product_id).map(|price| line_total(price, item.quantity))
            })
            .sum()
    }

    /// Capture the cart for persistence.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            version: CartSnapshot::CURRENT_VERSION,
            items: self
                .items
                .iter()
                .map(|item| SnapshotItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    options: item.options.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a cart from a snapshot.
    ///
    /// Snapshots come from the client session and are not trusted: keys are
    /// recomputed, duplicate selections merged, quantities clamped and zero
    /// lines dropped. A snapshot from an unknown format version yields an
    /// empty cart.
    #[must_use]
    pub fn from_snapshot(snapshot: CartSnapshot) -> Self {
        let mut cart = Self::new();
        if snapshot.version != CartSnapshot::CURRENT_VERSION {
            return cart;
        }

        for item in snapshot.items {
            cart.add(&item.product_id, i64::from(item.quantity), item.options);
        }
        cart
    }
}
