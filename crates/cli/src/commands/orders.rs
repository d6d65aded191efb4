//! Order management commands.
//!
//! # Usage
//!
//! ```bash
//! # Most recent orders
//! roastery orders list --limit 20
//!
//! # One order in full
//! roastery orders show ord_123
//!
//! # Attach a tracking number and send the shipping notification
//! roastery orders track ord_123 1Z999AA10123456784 --notify
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for storefront
//! - `STOREFRONT_BASE_URL` - Storefront to notify (`--notify` only)
//! - `CMS_WEBHOOK_SECRET` - Secret the storefront verifies CMS webhooks with (`--notify` only)
//!
//! `--notify` goes through the storefront's CMS webhook rather than sending
//! mail from here, so the send-once bookkeeping stays in one process.

use reqwest::header::CONTENT_TYPE;
use roastery_core::{Order, OrderId};
use roastery_storefront::db::{OrderRepository, RepositoryError};
use roastery_storefront::services::OrderStore;
use roastery_storefront::webhook::{CMS_SIGNATURE_HEADER, SignatureEncoding, WebhookVerifier};
use secrecy::SecretString;
use thiserror::Error;

use super::{ConnectError, required_env};

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderCommandError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// No order with this id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Tracking number was blank.
    #[error("Tracking number must not be empty")]
    EmptyTrackingNumber,

    /// The storefront webhook call failed.
    #[error("Notification request failed: {0}")]
    Notify(#[from] reqwest::Error),
}

async fn repository() -> Result<OrderRepository, ConnectError> {
    Ok(OrderRepository::new(super::connect().await?))
}

fn summary_line(order: &Order) -> String {
    format!(
        "{}  {}  {:<17}  {}  {}",
        order.id,
        order.order_timestamp.format("%Y-%m-%d %H:%M"),
        order.stage().to_string(),
        order
            .customer_email
            .as_ref()
            .map_or("-", |email| email.as_str()),
        order.product_summary(),
    )
}

fn detail_lines(order: &Order) -> Vec<String> {
    vec![
        format!("Order:           {}", order.id),
        format!("Placed:          {}", order.order_timestamp.to_rfc3339()),
        format!("Stage:           {}", order.stage()),
        format!(
            "Customer:        {}",
            order
                .customer_email
                .as_ref()
                .map_or("-", |email| email.as_str())
        ),
        format!("Payment session: {}", order.stripe_session_id),
        format!("Products:        {}", order.product_summary()),
        format!("Tracking:        {}", order.tracking_number().unwrap_or("-")),
        format!("Email sent:      {}", order.tracking_email_sent),
    ]
}

#[allow(clippy::print_stdout)]
fn print_lines(lines: impl IntoIterator<Item = String>) {
    for line in lines {
        println!("{line}");
    }
}

/// List the most recent orders.
pub async fn list(limit: i64) -> Result<(), OrderCommandError> {
    let orders = repository().await?.list_recent(limit.max(1)).await?;
    if orders.is_empty() {
        tracing::info!("No orders yet");
        return Ok(());
    }
    print_lines(orders.iter().map(summary_line));
    Ok(())
}

/// Show one order.
pub async fn show(id: &str) -> Result<(), OrderCommandError> {
    let id = OrderId::new(id);
    let order = repository()
        .await?
        .get(&id)
        .await?
        .ok_or(OrderCommandError::NotFound(id))?;
    print_lines(detail_lines(&order));
    Ok(())
}

/// Attach a tracking number, optionally asking the storefront to notify.
pub async fn track(id: &str, tracking_number: &str, notify: bool) -> Result<(), OrderCommandError> {
    let tracking_number = tracking_number.trim();
    if tracking_number.is_empty() {
        return Err(OrderCommandError::EmptyTrackingNumber);
    }

    let id = OrderId::new(id);
    let order = repository()
        .await?
        .set_tracking_number(&id, tracking_number)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => OrderCommandError::NotFound(id.clone()),
            other => other.into(),
        })?;
    tracing::info!(order_id = %order.id, tracking_number, "Tracking number attached");

    if order.tracking_email_sent {
        tracing::warn!(order_id = %order.id, "Notification was already sent; not sending again");
        return Ok(());
    }

    if notify {
        let outcome = notify_storefront(&order.id).await?;
        tracing::info!(order_id = %order.id, outcome = %outcome, "Storefront notified");
    }
    Ok(())
}

/// Post a signed order-changed event to the storefront's CMS webhook.
async fn notify_storefront(id: &OrderId) -> Result<String, OrderCommandError> {
    let base_url = required_env("STOREFRONT_BASE_URL")?;
    let secret = SecretString::from(required_env("CMS_WEBHOOK_SECRET")?);
    let signer = WebhookVerifier::new(secret, SignatureEncoding::Base64Url);

    let body = serde_json::json!({ "_id": id.as_str(), "_type": "order" }).to_string();
    let signature = signer.header_value(chrono::Utc::now().timestamp(), body.as_bytes());

    let response = reqwest::Client::new()
        .post(format!(
            "{}/api/webhooks/cms",
            base_url.trim_end_matches('/')
        ))
        .header(CMS_SIGNATURE_HEADER, signature)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?
        .error_for_status()?;

    let ack: serde_json::Value = response.json().await?;
    Ok(ack["outcome"].as_str().unwrap_or("unknown").to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use roastery_core::{CheckoutSessionId, Email};

    use super::*;

    fn order() -> Order {
        Order {
            id: OrderId::new("ord_1"),
            customer_email: Some(Email::parse("ada@example.com").unwrap()),
            order_items: Vec::new(),
            legacy_products: Some("2 x House Espresso".to_owned()),
            stripe_session_id: CheckoutSessionId::new("cs_1"),
            tracking_number: None,
            tracking_email_sent: false,
            order_timestamp: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_summary_line() {
        let line = summary_line(&order());
        assert!(line.starts_with("ord_1  2026-03-01 09:30  created"));
        assert!(line.ends_with("ada@example.com  2 x House Espresso"));
    }

    #[test]
    fn test_detail_lines_show_tracking() {
        let mut order = order();
        order.tracking_number = Some("1Z999".to_owned());
        let lines = detail_lines(&order);
        assert!(lines.contains(&"Stage:           tracking_attached".to_owned()));
        assert!(lines.contains(&"Tracking:        1Z999".to_owned()));
    }
}
