//! Headless CMS client.
//!
//! The CMS owns products and reviews. Product pages are cached in `moka`
//! for 5 minutes; lookups by id feed pricing and checkout and always go to
//! the API.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use roastery_core::{NewReview, Product, ProductId, ReviewId};

use crate::config::CmsConfig;
use crate::services::catalog::{Catalog, ProductPage};
use crate::services::reviews::ReviewStore;

use types::{
    MutateRequest, MutateResponse, Mutation, PRODUCT_BY_SLUG, PRODUCTS_BY_IDS, ProductDocument,
    ProductPageDocument, QueryResponse, ReviewDocument,
};

/// Errors that can occur when talking to the CMS.
#[derive(Debug, Error)]
pub enum CmsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the API.
    #[error("CMS returned {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A document violates a catalog invariant.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

// =============================================================================
// CmsClient
// =============================================================================

/// Client for the CMS query and mutation APIs.
#[derive(Clone)]
pub struct CmsClient {
    inner: Arc<CmsClientInner>,
}

struct CmsClientInner {
    client: reqwest::Client,
    query_url: Url,
    mutate_url: String,
    api_token: String,
    pages: Cache<String, ProductPage>,
}

impl CmsClient {
    /// Create a new CMS client.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if the configured API base is not a URL.
    pub fn new(config: &CmsConfig) -> Result<Self, url::ParseError> {
        let pages = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let base = format!(
            "{}/v{}/data",
            config.api_base.trim_end_matches('/'),
            config.api_version
        );

        Ok(Self {
            inner: Arc::new(CmsClientInner {
                client: reqwest::Client::new(),
                query_url: Url::parse(&format!("{base}/query/{}", config.dataset))?,
                mutate_url: format!("{base}/mutate/{}", config.dataset),
                api_token: config.api_token.expose_secret().to_string(),
                pages,
            }),
        })
    }

    /// Run a GROQ query with JSON-encoded parameters.
    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        params: &[(&str, serde_json::Value)],
    ) -> Result<T, CmsError> {
        let url = query_url(&self.inner.query_url, query, params);

        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(&self.inner.api_token)
            .send()
            .await?;

        let body: QueryResponse<T> = read_json(response).await?;
        Ok(body.result)
    }

    /// Drop every cached product page, e.g. after a product document changes.
    pub fn invalidate_pages(&self) {
        self.inner.pages.invalidate_all();
    }
}

/// Query endpoint with the GROQ query and `$`-prefixed JSON parameters.
fn query_url(endpoint: &Url, query: &str, params: &[(&str, serde_json::Value)]) -> Url {
    let mut url = endpoint.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("query", query);
        for (name, value) in params {
            pairs.append_pair(&format!("${name}"), &value.to_string());
        }
    }
    url
}

/// Read a response body, logging a truncated copy when it cannot be used.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CmsError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            status = %status,
            body = %text.chars().take(500).collect::<String>(),
            "CMS returned non-success status"
        );
        return Err(CmsError::Status {
            status: status.as_u16(),
            body: text.chars().take(200).collect(),
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %text.chars().take(500).collect::<String>(),
            "Failed to parse CMS response"
        );
        CmsError::Parse(e)
    })
}

// =============================================================================
// Catalog
// =============================================================================

impl Catalog for CmsClient {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, CmsError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<ProductDocument> = self
            .query(PRODUCTS_BY_IDS, &[("ids", serde_json::to_value(ids)?)])
            .await?;

        Ok(docs
            .into_iter()
            .map(Product::from)
            .filter(|product| match product.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping invalid product document");
                    false
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(slug = %slug))]
    async fn product_by_slug(&self, slug: &str) -> Result<Option<ProductPage>, CmsError> {
        if let Some(page) = self.inner.pages.get(slug).await {
            debug!("Cache hit for product page");
            return Ok(Some(page));
        }

        let doc: Option<ProductPageDocument> = self
            .query(PRODUCT_BY_SLUG, &[("slug", serde_json::Value::from(slug))])
            .await?;
        let Some(doc) = doc else {
            return Ok(None);
        };

        let page = ProductPage::from(doc);
        page.product
            .validate()
            .map_err(|e| CmsError::InvalidDocument(e.to_string()))?;

        self.inner.pages.insert(slug.to_owned(), page.clone()).await;
        Ok(Some(page))
    }
}

// =============================================================================
// ReviewStore
// =============================================================================

impl ReviewStore for CmsClient {
    #[instrument(skip(self, review), fields(product_id = %review.product_id))]
    async fn create_review(&self, review: &NewReview) -> Result<ReviewId, CmsError> {
        let request = MutateRequest {
            mutations: vec![Mutation::Create(ReviewDocument::from(review))],
        };

        let response = self
            .inner
            .client
            .post(format!("{}?returnIds=true", self.inner.mutate_url))
            .bearer_auth(&self.inner.api_token)
            .json(&request)
            .send()
            .await?;

        let body: MutateResponse = read_json(response).await?;
        body.results
            .into_iter()
            .next()
            .map(|result| ReviewId::new(result.id))
            .ok_or_else(|| CmsError::InvalidDocument("mutation returned no document id".to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::storefront_config;

    #[test]
    fn test_query_url_encodes_query_and_params() {
        let endpoint = Url::parse("https://abc123.api.sanity.io/v2024-01-01/data/query/production").unwrap();
        let url = query_url(
            &endpoint,
            r#"*[_type == "product" && slug.current == $slug][0]"#,
            &[("slug", serde_json::Value::from("house & co"))],
        );

        assert_eq!(url.path(), "/v2024-01-01/data/query/production");
        assert!(url.as_str().contains("&%24slug="));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                (
                    "query".to_owned(),
                    r#"*[_type == "product" && slug.current == $slug][0]"#.to_owned()
                ),
                ("$slug".to_owned(), r#""house & co""#.to_owned()),
            ]
        );
    }

    #[test]
    fn test_invalid_api_base_is_rejected() {
        let mut config = storefront_config().cms;
        config.api_base = "not a url".to_owned();
        assert!(CmsClient::new(&config).is_err());
    }
}
