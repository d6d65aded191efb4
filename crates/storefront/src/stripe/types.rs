//! Wire types for the payment processor's checkout API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roastery_core::CheckoutSessionId;

/// Event type that creates an order.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// `payment_status` of a session whose funds were captured.
pub const PAYMENT_STATUS_PAID: &str = "paid";

// =============================================================================
// Session creation
// =============================================================================

/// One price reference and quantity on a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub price: String,
    pub quantity: u32,
}

/// Everything needed to open a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub allowed_countries: Vec<String>,
    pub shipping_rate_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

/// A freshly created hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: CheckoutSessionId,
    pub url: String,
}

// =============================================================================
// Session retrieval / webhook payloads
// =============================================================================

/// Customer details collected on the hosted page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A checkout session as returned by the API and embedded in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: CheckoutSessionId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Unix seconds.
    #[serde(default)]
    pub created: i64,
}

impl CheckoutSession {
    /// Email collected at checkout, falling back to the prefilled one.
    #[must_use]
    pub fn customer_email(&self) -> Option<&str> {
        let non_blank = |email: &&str| !email.trim().is_empty();
        self.customer_details
            .as_ref()
            .and_then(|details| details.email.as_deref())
            .filter(non_blank)
            .or_else(|| self.customer_email.as_deref().filter(non_blank))
            .map(str::trim)
    }

    /// First word of the customer's name, if one was collected.
    #[must_use]
    pub fn customer_first_name(&self) -> Option<String> {
        self.customer_details
            .as_ref()
            .and_then(|details| details.name.as_deref())
            .and_then(|name| name.split_whitespace().next())
            .map(str::to_owned)
    }

    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some(PAYMENT_STATUS_PAID)
    }

    /// Creation time, or now if the processor did not send one.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created, 0)
            .filter(|_| self.created > 0)
            .unwrap_or_else(Utc::now)
    }
}

/// Envelope of a webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_event_object() {
        let json = serde_json::json!({
            "id": "cs_test_a1",
            "object": "checkout.session",
            "payment_status": "paid",
            "customer_email": null,
            "customer_details": { "email": "Ada@Example.com", "name": "Ada Lovelace" },
            "metadata": { "products": "beans x 2" },
            "created": 1_767_225_600
        });
        let session: CheckoutSession = serde_json::from_value(json).unwrap();

        assert!(session.is_paid());
        assert_eq!(session.customer_email(), Some("Ada@Example.com"));
        assert_eq!(session.customer_first_name().as_deref(), Some("Ada"));
        assert_eq!(session.created_at().timestamp(), 1_767_225_600);
    }

    #[test]
    fn test_customer_email_fallback() {
        let json = serde_json::json!({
            "id": "cs_test_a2",
            "customer_email": "buyer@example.com",
            "customer_details": { "email": "  " }
        });
        let session: CheckoutSession = serde_json::from_value(json).unwrap();
        assert_eq!(session.customer_email(), Some("buyer@example.com"));
        assert!(!session.is_paid());
        assert_eq!(session.customer_first_name(), None);
    }
}
