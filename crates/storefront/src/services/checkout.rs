//! Checkout session builder.
//!
//! Re-validates every cart line against the catalog before asking the payment
//! processor for a hosted session. Nothing is written anywhere until the
//! processor answers, so a failure at any step leaves no trace and the cart
//! untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use roastery_core::checkout::CheckoutMetadata;
use roastery_core::{CheckoutSessionId, LineItem, MAX_QUANTITY_PER_ORDER, Options, OrderItem, Product, ProductId};

use crate::cms::CmsError;
use crate::services::catalog::Catalog;
use crate::stripe::{CheckoutSession, CreatedSession, PaymentError, SessionLineItem, SessionRequest};

/// Option name recorded as the order line's size.
const SIZE_OPTION: &str = "size";

/// Placeholder the processor replaces with the real session id.
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Hosted checkout sessions.
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session.
    fn create_checkout_session(
        &self,
        request: &SessionRequest,
    ) -> impl Future<Output = Result<CreatedSession, PaymentError>> + Send;

    /// Read a session back, e.g. to confirm payment or find the customer name.
    fn retrieve_session(
        &self,
        id: &CheckoutSessionId,
    ) -> impl Future<Output = Result<CheckoutSession, PaymentError>> + Send;
}

/// One line to check out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub options: Options,
}

impl From<&LineItem> for CheckoutItem {
    fn from(line: &LineItem) -> Self {
        Self {
            product_id: line.product_id().clone(),
            quantity: i64::from(line.quantity()),
            options: line.options().clone(),
        }
    }
}

/// Why a checkout session could not be created.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("your cart is empty")]
    EmptyCart,

    #[error("quantity {quantity} for {product_id} is out of range")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    #[error("product {0} no longer exists")]
    ProductNotFound(ProductId),

    #[error("{0} cannot be purchased online right now")]
    MissingPriceReference(ProductId),

    #[error("{name} is out of stock")]
    ProductUnavailable { product_id: ProductId, name: String },

    #[error("catalog unavailable: {0}")]
    Catalog(#[from] CmsError),

    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),
}

impl CheckoutError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EmptyCart => "empty_cart",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::ProductNotFound(_) => "product_not_found",
            Self::MissingPriceReference(_) => "missing_price_reference",
            Self::ProductUnavailable { .. } => "product_unavailable",
            Self::Catalog(_) => "catalog_unavailable",
            Self::Payment(_) => "payment_failed",
        }
    }
}

/// Fixed session parameters.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub allowed_countries: Vec<String>,
    pub shipping_rate_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSettings {
    /// Derive return URLs from the storefront's public base URL.
    #[must_use]
    pub fn new(base_url: &str, allowed_countries: Vec<String>, shipping_rate_id: String) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            allowed_countries,
            shipping_rate_id,
            success_url: format!("{base}/checkout/success?session_id={SESSION_ID_PLACEHOLDER}"),
            cancel_url: format!("{base}/cart"),
        }
    }
}

/// Builds hosted checkout sessions from cart contents.
pub struct CheckoutService<C, P> {
    catalog: C,
    gateway: P,
    settings: CheckoutSettings,
}

impl<C: Catalog, P: PaymentGateway> CheckoutService<C, P> {
    #[must_use]
    pub const fn new(catalog: C, gateway: P, settings: CheckoutSettings) -> Self {
        Self {
            catalog,
            gateway,
            settings,
        }
    }

    /// Validate `items` against the catalog and open a session.
    ///
    /// # Errors
    ///
    /// Returns the first [`CheckoutError`] found; the payment processor is
    /// only contacted once every line checks out.
    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn create_session(&self, items: &[CheckoutItem]) -> Result<CreatedSession, CheckoutError> {
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let max = i64::from(MAX_QUANTITY_PER_ORDER);
        if let Some(item) = items.iter().find(|item| !(1..=max).contains(&item.quantity)) {
            return Err(CheckoutError::InvalidQuantity {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            });
        }

        let ids: Vec<ProductId> = items
            .iter()
            .map(|item| item.product_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products: BTreeMap<ProductId, Product> = self
            .catalog
            .products_by_ids(&ids)
            .await?
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();

        let mut line_items = Vec::with_capacity(items.len());
        let mut order_items = Vec::with_capacity(items.len());
        for item in items {
            let (line, order_item) = resolve_line(item, &products)?;
            line_items.push(line);
            order_items.push(order_item);
        }

        let request = SessionRequest {
            line_items,
            allowed_countries: self.settings.allowed_countries.clone(),
            shipping_rate_id: self.settings.shipping_rate_id.clone(),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
            metadata: CheckoutMetadata::for_items(&order_items).into_map(),
        };

        Ok(self.gateway.create_checkout_session(&request).await?)
    }

    /// Read a session back from the processor.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the processor cannot be reached or does not
    /// know the session.
    pub async fn retrieve_session(&self, id: &CheckoutSessionId) -> Result<CheckoutSession, PaymentError> {
        self.gateway.retrieve_session(id).await
    }
}

/// Check one line against its product.
fn resolve_line(
    item: &CheckoutItem,
    products: &BTreeMap<ProductId, Product>,
) -> Result<(SessionLineItem, OrderItem), CheckoutError> {
    let product = products
        .get(&item.product_id)
        .ok_or_else(|| CheckoutError::ProductNotFound(item.product_id.clone()))?;

    // Bounds were checked before the catalog lookup.
    let quantity = u32::try_from(item.quantity).map_err(|_| CheckoutError::InvalidQuantity {
        product_id: item.product_id.clone(),
        quantity: item.quantity,
    })?;

    if !product.can_fulfil(&item.options, quantity) {
        return Err(CheckoutError::ProductUnavailable {
            product_id: product.id.clone(),
            name: product.name.clone(),
        });
    }

    let price = product
        .stripe_price_id
        .as_deref()
        .map(str::trim)
        .filter(|price| !price.is_empty())
        .ok_or_else(|| CheckoutError::MissingPriceReference(product.id.clone()))?;

    Ok((
        SessionLineItem {
            price: price.to_owned(),
            quantity,
        },
        OrderItem {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity,
            size: item.options.get(SIZE_OPTION).cloned(),
        },
    ))
}
