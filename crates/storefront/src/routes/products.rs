//! Product page handler.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::catalog::{Catalog, ProductPage};
use crate::state::AppState;

/// Product with its approved reviews.
#[instrument(skip(state), fields(slug = %slug))]
pub async fn show(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<ProductPage>> {
    state
        .catalog()
        .product_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Product {slug}")))
}
