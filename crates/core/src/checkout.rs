//! Checkout metadata attached to hosted payment sessions.
//!
//! The payment processor stores string metadata on a session and hands it
//! back in the completion webhook. Two entries are written:
//!
//! - `products`: human summary, `<productId> x <qty> (<size>)` joined by `, `
//! - `order_items`: compact JSON of [`OrderItem`]s, only when it fits the
//!   processor's per-value limit
//!
//! The completion handler prefers `order_items` and falls back to keeping the
//! `products` summary as free text.

use std::collections::BTreeMap;

use crate::order::OrderItem;

/// Longest metadata value the payment processor accepts.
pub const METADATA_VALUE_LIMIT: usize = 500;

/// Metadata key for the human-readable cart summary.
pub const PRODUCTS_KEY: &str = "products";

/// Metadata key for the structured order items.
pub const ORDER_ITEMS_KEY: &str = "order_items";

/// Cart description carried through the payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub products: String,
    pub order_items: Option<String>,
}

impl CheckoutMetadata {
    /// Build metadata for the given items.
    #[must_use]
    pub fn for_items(items: &[OrderItem]) -> Self {
        Self {
            products: summarize(items),
            order_items: encode_order_items(items),
        }
    }

    /// Flatten into key/value pairs for the session request.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::from([(PRODUCTS_KEY.to_owned(), self.products)]);
        if let Some(items) = self.order_items {
            map.insert(ORDER_ITEMS_KEY.to_owned(), items);
        }
        map
    }

    /// Read metadata back from a completed session.
    ///
    /// Returns `None` when neither key is present.
    #[must_use]
    pub fn from_map(map: &BTreeMap<String, String>) -> Option<Self> {
        let products = map.get(PRODUCTS_KEY).cloned();
        let order_items = map.get(ORDER_ITEMS_KEY).cloned();
        if products.is_none() && order_items.is_none() {
            return None;
        }
        Some(Self {
            products: products.unwrap_or_default(),
            order_items,
        })
    }

    /// Structured items, if present and well-formed.
    #[must_use]
    pub fn decoded_items(&self) -> Option<Vec<OrderItem>> {
        self.order_items
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<OrderItem>>(raw).ok())
            .filter(|items| !items.is_empty())
    }
}

/// Audit summary of a cart, truncated to the metadata limit.
#[must_use]
pub fn summarize(items: &[OrderItem]) -> String {
    let summary = items
        .iter()
        .map(|item| match &item.size {
            Some(size) => format!("{} x {} ({size})", item.product_id, item.quantity),
            None => format!("{} x {}", item.product_id, item.quantity),
        })
        .collect::<Vec<_>>()
        .join(", ");

    if summary.chars().count() <= METADATA_VALUE_LIMIT {
        summary
    } else {
        summary.chars().take(METADATA_VALUE_LIMIT).collect()
    }
}

/// Compact JSON of the items, or `None` if it would exceed the limit.
#[must_use]
pub fn encode_order_items(items: &[OrderItem]) -> Option<String> {
    serde_json::to_string(items)
        .ok()
        .filter(|json| json.chars().count() <= METADATA_VALUE_LIMIT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ProductId;

    fn item(id: &str, quantity: u32, size: Option<&str>) -> OrderItem {
        OrderItem {
            product_id: ProductId::new(id),
            product_name: format!("Product {id}"),
            quantity,
            size: size.map(str::to_owned),
        }
    }

    #[test]
    fn test_summary_format() {
        let items = [item("beans", 2, None), item("tee", 1, Some("M"))];
        assert_eq!(summarize(&items), "beans x 2, tee x 1 (M)");
    }

    #[test]
    fn test_summary_truncates() {
        let items: Vec<OrderItem> = (0..100).map(|i| item(&format!("p{i}"), 1, None)).collect();
        assert_eq!(summarize(&items).chars().count(), METADATA_VALUE_LIMIT);
    }

    #[test]
    fn test_order_items_dropped_when_too_long() {
        let items: Vec<OrderItem> = (0..30).map(|i| item(&format!("p{i}"), 1, None)).collect();
        let metadata = CheckoutMetadata::for_items(&items);
        assert!(metadata.order_items.is_none());
        assert!(!metadata.into_map().contains_key(ORDER_ITEMS_KEY));
    }

    #[test]
    fn test_map_round_trip_recovers_items() {
        let items = vec![item("beans", 2, Some("1kg"))];
        let map = CheckoutMetadata::for_items(&items).into_map();
        let restored = CheckoutMetadata::from_map(&map).unwrap();
        assert_eq!(restored.decoded_items(), Some(items));
    }

    #[test]
    fn test_from_map_without_keys() {
        assert_eq!(CheckoutMetadata::from_map(&BTreeMap::new()), None);
    }

    #[test]
    fn test_malformed_items_are_ignored() {
        let metadata = CheckoutMetadata {
            products: "beans x 1".to_owned(),
            order_items: Some("{not json".to_owned()),
        };
        assert_eq!(metadata.decoded_items(), None);
    }
}
