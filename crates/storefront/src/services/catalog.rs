//! Read access to the product catalog.

use std::collections::BTreeMap;
use std::future::Future;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use roastery_core::{Product, ProductId, Review};

use crate::cms::CmsError;

/// A product with its approved reviews, as shown on a product page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    #[serde(flatten)]
    pub product: Product,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// The authoritative product catalog.
pub trait Catalog: Send + Sync {
    /// Products with the given ids. Unknown ids are simply absent from the
    /// result. Never served from cache.
    fn products_by_ids(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<Product>, CmsError>> + Send;

    /// One product by slug together with its approved reviews.
    fn product_by_slug(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<Option<ProductPage>, CmsError>> + Send;
}

/// Current prices for `ids`, keyed by product id.
///
/// # Errors
///
/// Returns [`CmsError`] if the catalog cannot be queried.
pub async fn current_prices<C: Catalog>(
    catalog: &C,
    ids: &[ProductId],
) -> Result<BTreeMap<ProductId, Decimal>, CmsError> {
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(catalog
        .products_by_ids(ids)
        .await?
        .into_iter()
        .map(|product| (product.id, product.price))
        .collect())
}
