//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding. All route handlers return `Result<T, AppError>`.
//!
//! Responses are JSON: `{ "error": "<kind>", "message": "<text>" }`. Status
//! codes follow who has to act: 400 for bad input or a bad signature, 422
//! for requests that are well-formed but inconsistent with stored data, 429
//! when rate limited, 5xx when a dependency failed and the caller should
//! retry.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use roastery_core::product::SelectionError;

use crate::cms::CmsError;
use crate::db::RepositoryError;
use crate::services::checkout::CheckoutError;
use crate::services::orders::ReconcileError;
use crate::services::reviews::ReviewError;
use crate::stripe::PaymentError;
use crate::webhook::SignatureError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    /// Option selection does not fit the product.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// Product cannot be added right now.
    #[error("{0} is out of stock")]
    OutOfStock(String),

    /// Webhook signature did not verify.
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),

    /// CMS operation failed.
    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),

    /// Payment processor operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    /// Machine-readable code sent as `error`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Checkout(err) => err.kind(),
            Self::Reconcile(err) => err.kind(),
            Self::Review(err) => err.kind(),
            Self::Selection(_) => "invalid_selection",
            Self::OutOfStock(_) => "product_unavailable",
            Self::Signature(_) => "invalid_signature",
            Self::Cms(_) => "catalog_unavailable",
            Self::Payment(_) => "payment_failed",
            Self::Database(_) | Self::Internal(_) => "internal_error",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart | CheckoutError::InvalidQuantity { .. } => {
                    StatusCode::BAD_REQUEST
                }
                CheckoutError::ProductNotFound(_)
                | CheckoutError::MissingPriceReference(_)
                | CheckoutError::ProductUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::Catalog(_) | CheckoutError::Payment(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Reconcile(err) => match err {
                ReconcileError::OrderNotFound(_)
                | ReconcileError::MissingCustomerEmail
                | ReconcileError::InvalidCustomerEmail(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ReconcileError::Email(_) => StatusCode::BAD_GATEWAY,
                ReconcileError::Store(_) | ReconcileError::MarkSentFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Review(err) => match err {
                ReviewError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                ReviewError::Invalid(_) => StatusCode::BAD_REQUEST,
                ReviewError::Store(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Selection(_) | Self::Signature(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::OutOfStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Cms(_) | Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Client-facing message. Dependency failures are not detailed.
    fn public_message(&self, status: StatusCode) -> String {
        match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            StatusCode::BAD_GATEWAY => "External service error, please try again".to_string(),
            _ => match self {
                Self::NotFound(what) => format!("{what} not found"),
                Self::BadRequest(msg) => msg.clone(),
                _ => self.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                kind = self.kind(),
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Request rejected");
        }

        let retry_after = match &self {
            Self::Review(ReviewError::RateLimited(limit)) => Some(limit.retry_after.as_secs().max(1)),
            _ => None,
        };

        let body = ErrorBody {
            error: self.kind(),
            message: self.public_message(status),
        };
        let mut response = (status, Json(body)).into_response();

        if let Some(seconds) = retry_after
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}
