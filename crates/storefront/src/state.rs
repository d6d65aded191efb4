//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::cms::CmsClient;
use crate::config::StorefrontConfig;
use crate::db::OrderRepository;
use crate::middleware::rate_limit::ReviewRateLimiter;
use crate::services::checkout::{CheckoutService, CheckoutSettings};
use crate::services::email::EmailService;
use crate::services::orders::OrderReconciler;
use crate::services::reviews::ReviewService;
use crate::stripe::StripeClient;
use crate::webhook::{SignatureEncoding, WebhookVerifier};

/// Checkout wired to the CMS and the payment processor.
pub type StorefrontCheckout = CheckoutService<CmsClient, StripeClient>;

/// Reconciler wired to Postgres, SMTP and the payment processor.
pub type StorefrontReconciler = OrderReconciler<OrderRepository, EmailService, StripeClient>;

/// Review intake writing to the CMS.
pub type StorefrontReviews = ReviewService<CmsClient>;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid SMTP configuration: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("invalid CMS API base: {0}")]
    CmsUrl(#[from] url::ParseError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    catalog: CmsClient,
    checkout: StorefrontCheckout,
    reconciler: StorefrontReconciler,
    reviews: StorefrontReviews,
    stripe_webhooks: WebhookVerifier,
    cms_webhooks: WebhookVerifier,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay configuration is invalid.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let catalog = CmsClient::new(&config.cms)?;
        let stripe = StripeClient::new(&config.stripe);
        let mailer = EmailService::new(&config.email)?;

        let checkout = CheckoutService::new(
            catalog.clone(),
            stripe.clone(),
            CheckoutSettings::new(
                &config.base_url,
                config.stripe.allowed_countries.clone(),
                config.stripe.shipping_rate_id.clone(),
            ),
        );
        let reconciler = OrderReconciler::new(
            OrderRepository::new(pool.clone()),
            mailer,
            stripe,
            config.tracking_url_base.clone(),
        );
        let reviews = ReviewService::new(catalog.clone(), ReviewRateLimiter::default());

        let stripe_webhooks =
            WebhookVerifier::new(config.stripe.webhook_secret.clone(), SignatureEncoding::Hex);
        let cms_webhooks =
            WebhookVerifier::new(config.cms.webhook_secret.clone(), SignatureEncoding::Base64Url);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                catalog,
                checkout,
                reconciler,
                reviews,
                stripe_webhooks,
                cms_webhooks,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The product catalog.
    #[must_use]
    pub fn catalog(&self) -> &CmsClient {
        &self.inner.catalog
    }

    #[must_use]
    pub fn checkout(&self) -> &StorefrontCheckout {
        &self.inner.checkout
    }

    #[must_use]
    pub fn reconciler(&self) -> &StorefrontReconciler {
        &self.inner.reconciler
    }

    #[must_use]
    pub fn reviews(&self) -> &StorefrontReviews {
        &self.inner.reviews
    }

    /// Verifier for payment processor webhooks.
    #[must_use]
    pub fn stripe_webhooks(&self) -> &WebhookVerifier {
        &self.inner.stripe_webhooks
    }

    /// Verifier for CMS webhooks.
    #[must_use]
    pub fn cms_webhooks(&self) -> &WebhookVerifier {
        &self.inner.cms_webhooks
    }
}
