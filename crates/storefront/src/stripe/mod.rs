//! Payment processor client.
//!
//! Talks to the hosted-checkout REST API with `reqwest`: form-encoded POST to
//! create sessions, GET to read them back. Webhook signature checks live in
//! [`crate::webhook`].

pub mod types;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::instrument;

use roastery_core::CheckoutSessionId;

use crate::config::StripeConfig;
use crate::services::checkout::PaymentGateway;
pub use types::{
    CHECKOUT_SESSION_COMPLETED, CheckoutSession, CreatedSession, CustomerDetails, SessionLineItem,
    SessionRequest, StripeEvent,
};

/// Errors talking to the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("payment API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A created session came back without a redirect URL.
    #[error("session {0} has no redirect URL")]
    MissingRedirectUrl(CheckoutSessionId),
}

// =============================================================================
// StripeClient
// =============================================================================

/// Client for the hosted checkout API.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl StripeClient {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            inner: Arc::new(StripeClientInner {
                client: reqwest::Client::new(),
                api_base: config.api_base.trim_end_matches('/').to_owned(),
                secret_key: config.secret_key.clone(),
            }),
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.inner.api_base)
    }

    /// Turn a response into `T`, mapping error bodies to [`PaymentError::Api`].
    async fn read_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<types::ApiErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.error.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            tracing::error!(status = %status, message = %message, "Payment API returned non-success status");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

impl PaymentGateway for StripeClient {
    #[instrument(skip(self, request), fields(line_items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CreatedSession, PaymentError> {
        let response = self
            .inner
            .client
            .post(self.sessions_url())
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&session_form(request))
            .send()
            .await?;

        let session: CheckoutSession = Self::read_response(response).await?;
        let url = session
            .url
            .clone()
            .ok_or_else(|| PaymentError::MissingRedirectUrl(session.id.clone()))?;

        tracing::info!(session_id = %session.id, "Checkout session created");
        Ok(CreatedSession {
            session_id: session.id,
            url,
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn retrieve_session(&self, id: &CheckoutSessionId) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/{}", self.sessions_url(), urlencoding::encode(id.as_str()));
        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await?;

        Self::read_response(response).await
    }
}

/// Flatten a session request into the API's bracketed form encoding.
fn session_form(request: &SessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
        (
            "shipping_options[0][shipping_rate]".to_owned(),
            request.shipping_rate_id.clone(),
        ),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        form.push((format!("line_items[{i}][price]"), item.price.clone()));
        form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
    }

    for (i, country) in request.allowed_countries.iter().enumerate() {
        form.push((
            format!("shipping_address_collection[allowed_countries][{i}]"),
            country.clone(),
        ));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }

    form
}
