//! Order repository for database operations.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate builds
//! without a live database or an offline query cache.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use roastery_core::{CheckoutSessionId, Email, NewOrder, Order, OrderId, OrderItem};

use super::RepositoryError;
use crate::services::orders::{InsertOutcome, OrderStore};

/// Raw `orders` row.
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_email: Option<String>,
    order_items: Json<Vec<OrderItem>>,
    legacy_products: Option<String>,
    stripe_session_id: String,
    tracking_number: Option<String>,
    tracking_email_sent: bool,
    order_timestamp: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let customer_email = row
            .customer_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!(
                    "invalid email on order {}: {e}",
                    row.id
                ))
            })?;

        Ok(Self {
            id: OrderId::new(row.id),
            customer_email,
            order_items: row.order_items.0,
            legacy_products: row.legacy_products,
            stripe_session_id: CheckoutSessionId::new(row.stripe_session_id),
            tracking_number: row.tracking_number,
            tracking_email_sent: row.tracking_email_sent,
            order_timestamp: row.order_timestamp,
        })
    }
}

/// Repository for order database operations.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OrderStore for OrderRepository {
    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        let id = OrderId::generate();

        let inserted: Option<(String,)> = sqlx::query_as(
            r"
            INSERT INTO orders (id, customer_email, order_items, legacy_products,
                                stripe_session_id, order_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (stripe_session_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(id.as_str())
        .bind(order.customer_email.as_str())
        .bind(Json(&order.order_items))
        .bind(order.legacy_products.as_deref())
        .bind(order.stripe_session_id.as_str())
        .bind(order.order_timestamp)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            return Ok(InsertOutcome::Inserted(OrderId::new(id)));
        }

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM orders WHERE stripe_session_id = $1")
                .bind(order.stripe_session_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        existing
            .map(|(id,)| InsertOutcome::Existing(OrderId::new(id)))
            .ok_or_else(|| {
                RepositoryError::Conflict(format!(
                    "order for session {} neither inserted nor found",
                    order.stripe_session_id
                ))
            })
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r"
            SELECT id, customer_email, order_items, legacy_products, stripe_session_id,
                   tracking_number, tracking_email_sent, order_timestamp
            FROM orders
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn set_tracking_number(
        &self,
        id: &OrderId,
        tracking_number: &str,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r"
            UPDATE orders
            SET tracking_number = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, customer_email, order_items, legacy_products, stripe_session_id,
                      tracking_number, tracking_email_sent, order_timestamp
            ",
        )
        .bind(id.as_str())
        .bind(tracking_number)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn mark_tracking_email_sent(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET tracking_email_sent = true, tracking_email_sent_at = now(), updated_at = now()
            WHERE id = $1 AND tracking_email_sent = false AND tracking_number IS NOT NULL
            ",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r"
            SELECT id, customer_email, order_items, legacy_products, stripe_session_id,
                   tracking_number, tracking_email_sent, order_timestamp
            FROM orders
            ORDER BY order_timestamp DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}
