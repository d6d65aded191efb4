//! Orders created after a completed payment.
//!
//! An order moves through three stages and never back:
//!
//! ```text
//! Created ──(tracking number attached)──► TrackingAttached ──(email sent)──► Notified
//! ```
//!
//! `tracking_email_sent` is the idempotency flag for the notification. It only
//! flips to `true` after a send succeeded for an order with a tracking number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CheckoutSessionId, Email, OrderId, ProductId};

/// One purchased line as recorded on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl OrderItem {
    /// Human-readable line, e.g. `2 x House Espresso (Size: 1kg)`.
    #[must_use]
    pub fn describe(&self) -> String {
        describe_line(self.quantity, &self.product_name, self.size.as_deref())
    }
}

/// Where an order is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStage {
    Created,
    TrackingAttached,
    Notified,
}

impl std::fmt::Display for OrderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::TrackingAttached => write!(f, "tracking_attached"),
            Self::Notified => write!(f, "notified"),
        }
    }
}

/// A durable order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_email: Option<Email>,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
    /// Free-text product list from older orders, or the checkout summary
    /// when structured items were not available.
    #[serde(default)]
    pub legacy_products: Option<String>,
    pub stripe_session_id: CheckoutSessionId,
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_email_sent: bool,
    pub order_timestamp: DateTime<Utc>,
}

impl Order {
    /// The tracking number, if one is attached and not blank.
    #[must_use]
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number
            .as_deref()
            .map(str::trim)
            .filter(|number| !number.is_empty())
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn stage(&self) -> OrderStage {
        if self.tracking_email_sent {
            OrderStage::Notified
        } else if self.tracking_number().is_some() {
            OrderStage::TrackingAttached
        } else {
            OrderStage::Created
        }
    }

    /// Summary of what was bought, for notification emails.
    ///
    /// Structured items win. Otherwise the legacy field is parsed as a JSON
    /// product list; if that fails the raw text is shown as-is.
    #[must_use]
    pub fn product_summary(&self) -> String {
        if !self.order_items.is_empty() {
            return self
                .order_items
                .iter()
                .map(OrderItem::describe)
                .collect::<Vec<_>>()
                .join(", ");
        }

        let Some(legacy) = self
            .legacy_products
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        else {
            return "your order".to_owned();
        };

        match serde_json::from_str::<Vec<LegacyProduct>>(legacy) {
            Ok(products) if !products.is_empty() => products
                .iter()
                .map(|p| describe_line(p.quantity, &p.name, p.size.as_deref()))
                .collect::<Vec<_>>()
                .join(", "),
            _ => legacy.to_owned(),
        }
    }
}

/// Line shape used by the legacy free-text product field.
#[derive(Debug, Deserialize)]
struct LegacyProduct {
    name: String,
    #[serde(default = "one")]
    quantity: u32,
    #[serde(default)]
    size: Option<String>,
}

const fn one() -> u32 {
    1
}

fn describe_line(quantity: u32, name: &str, size: Option<&str>) -> String {
    match size {
        Some(size) if !size.is_empty() => format!("{quantity} x {name} (Size: {size})"),
        _ => format!("{quantity} x {name}"),
    }
}

/// Everything needed to create an order from a completed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_email: Email,
    pub order_items: Vec<OrderItem>,
    pub legacy_products: Option<String>,
    pub stripe_session_id: CheckoutSessionId,
    pub order_timestamp: DateTime<Utc>,
}

impl NewOrder {
    /// Materialize the order under a freshly minted id.
    #[must_use]
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            customer_email: Some(self.customer_email),
            order_items: self.order_items,
            legacy_products: self.legacy_products,
            stripe_session_id: self.stripe_session_id,
            tracking_number: None,
            tracking_email_sent: false,
            order_timestamp: self.order_timestamp,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order {
            id: OrderId::new("o-1"),
            customer_email: Some(Email::parse("buyer@example.com").unwrap()),
            order_items: vec![],
            legacy_products: None,
            stripe_session_id: CheckoutSessionId::new("cs_1"),
            tracking_number: None,
            tracking_email_sent: false,
            order_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_stage_progression() {
        let mut order = order();
        assert_eq!(order.stage(), OrderStage::Created);

        order.tracking_number = Some("   ".to_owned());
        assert_eq!(order.stage(), OrderStage::Created);

        order.tracking_number = Some("9400111899223".to_owned());
        assert_eq!(order.stage(), OrderStage::TrackingAttached);

        order.tracking_email_sent = true;
        assert_eq!(order.stage(), OrderStage::Notified);
    }

    #[test]
    fn test_summary_prefers_structured_items() {
        let mut order = order();
        order.legacy_products = Some("ignored".to_owned());
        order.order_items = vec![
            OrderItem {
                product_id: ProductId::new("a"),
                product_name: "House Espresso".to_owned(),
                quantity: 2,
                size: None,
            },
            OrderItem {
                product_id: ProductId::new("t"),
                product_name: "Roastery Tee".to_owned(),
                quantity: 1,
                size: Some("M".to_owned()),
            },
        ];
        assert_eq!(
            order.product_summary(),
            "2 x House Espresso, 1 x Roastery Tee (Size: M)"
        );
    }

    #[test]
    fn test_summary_parses_legacy_json() {
        let mut order = order();
        order.legacy_products =
            Some(r#"[{"name":"Decaf","quantity":3},{"name":"Tee","size":"L"}]"#.to_owned());
        assert_eq!(order.product_summary(), "3 x Decaf, 1 x Tee (Size: L)");
    }

    #[test]
    fn test_summary_falls_back_to_raw_legacy_text() {
        let mut order = order();
        order.legacy_products = Some("decaf x 2, tee x 1 (M)".to_owned());
        assert_eq!(order.product_summary(), "decaf x 2, tee x 1 (M)");
    }

    #[test]
    fn test_summary_without_anything() {
        assert_eq!(order().product_summary(), "your order");
    }
}
