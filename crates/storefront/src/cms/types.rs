//! Wire types for the CMS query and mutation APIs.

use serde::{Deserialize, Serialize};

use roastery_core::{NewReview, OptionSchema, Product, ProductId, Review, Stock};

use crate::services::catalog::ProductPage;

// =============================================================================
// Queries
// =============================================================================

/// Projection shared by every product query.
macro_rules! product_projection {
    () => {
        r#""id": _id, "slug": slug.current, name, price, "images": images[].asset->url, stock, options[]{name, values}, isOutOfStock, stripePriceId"#
    };
}

/// Products by id. Parameter: `$ids`.
pub const PRODUCTS_BY_IDS: &str = concat!(
    r#"*[_type == "product" && _id in $ids]{"#,
    product_projection!(),
    "}"
);

/// One product by slug with its approved reviews, newest first. Parameter: `$slug`.
pub const PRODUCT_BY_SLUG: &str = concat!(
    r#"*[_type == "product" && slug.current == $slug][0]{"#,
    product_projection!(),
    r#", "reviews": *[_type == "review" && product._ref == ^._id && approved == true] | order(_createdAt desc){"id": _id, rating, title, comment, authorName, "createdAt": _createdAt}}"#
);

/// Envelope of every query response.
#[derive(Debug, Deserialize)]
pub struct QueryResponse<T> {
    pub result: T,
}

// =============================================================================
// Documents
// =============================================================================

/// One option definition as authored in the CMS.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionDocument {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Product as projected by the queries above.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDocument {
    pub id: ProductId,
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    pub price: rust_decimal::Decimal,
    #[serde(default)]
    pub images: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub stock: Option<Stock>,
    #[serde(default)]
    pub options: Option<Vec<OptionDocument>>,
    #[serde(default)]
    pub is_out_of_stock: Option<bool>,
    #[serde(default)]
    pub stripe_price_id: Option<String>,
}

impl From<ProductDocument> for Product {
    fn from(doc: ProductDocument) -> Self {
        let options: OptionSchema = doc
            .options
            .unwrap_or_default()
            .into_iter()
            .filter(|option| !option.values.is_empty())
            .map(|option| (option.name, option.values))
            .collect();

        Self {
            slug: doc.slug.unwrap_or_else(|| doc.id.to_string()),
            id: doc.id,
            name: doc.name,
            price: doc.price,
            images: doc.images.unwrap_or_default().into_iter().flatten().collect(),
            stock: doc.stock.unwrap_or_default(),
            options,
            is_out_of_stock: doc.is_out_of_stock.unwrap_or(false),
            stripe_price_id: doc.stripe_price_id.filter(|id| !id.trim().is_empty()),
        }
    }
}

/// Product page as projected by [`PRODUCT_BY_SLUG`].
#[derive(Debug, Clone, Deserialize)]
pub struct ProductPageDocument {
    #[serde(flatten)]
    pub product: ProductDocument,
    #[serde(default)]
    pub reviews: Option<Vec<Review>>,
}

impl From<ProductPageDocument> for ProductPage {
    fn from(doc: ProductPageDocument) -> Self {
        Self {
            product: doc.product.into(),
            reviews: doc.reviews.unwrap_or_default(),
        }
    }
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Serialize)]
pub struct MutateRequest<'a> {
    pub mutations: Vec<Mutation<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation<'a> {
    Create(ReviewDocument<'a>),
}

#[derive(Debug, Serialize)]
pub struct Reference<'a> {
    #[serde(rename = "_type")]
    pub kind: &'static str,
    #[serde(rename = "_ref")]
    pub reference: &'a str,
}

/// A review as written to the CMS. Always created unapproved.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDocument<'a> {
    #[serde(rename = "_type")]
    pub kind: &'static str,
    pub product: Reference<'a>,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    pub comment: &'a str,
    pub author_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<&'a str>,
    pub approved: bool,
}

impl<'a> From<&'a NewReview> for ReviewDocument<'a> {
    fn from(review: &'a NewReview) -> Self {
        Self {
            kind: "review",
            product: Reference {
                kind: "reference",
                reference: review.product_id.as_str(),
            },
            rating: review.rating.value(),
            title: review.title.as_deref(),
            comment: &review.comment,
            author_name: &review.author_name,
            author_email: review.author_email.as_ref().map(roastery_core::Email::as_str),
            approved: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MutateResponse {
    #[serde(default)]
    pub results: Vec<MutateResult>,
}

#[derive(Debug, Deserialize)]
pub struct MutateResult {
    pub id: String,
}
