//! Cart API handlers.
//!
//! The cart lives in the visitor's session as a versioned snapshot. Every
//! response carries the full cart view priced at current catalog prices.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use roastery_core::{AddOutcome, LineItemKey, MAX_QUANTITY_PER_ORDER, Options, ProductId};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::cart::{CartStore, CartView};
use crate::services::catalog::Catalog;
use crate::state::AppState;

const fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i64,
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub key: LineItemKey,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub key: LineItemKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResponse {
    #[serde(flatten)]
    pub outcome: AddOutcome,
    /// Shown to the shopper when fewer units were added than asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub cart: CartView,
}

/// Explain a partial add.
fn clamp_message(outcome: &AddOutcome) -> Option<String> {
    if outcome.fully_added || outcome.requested == 0 {
        return None;
    }
    Some(if outcome.added == 0 {
        format!("You already have the maximum of {MAX_QUANTITY_PER_ORDER} in your cart")
    } else {
        format!(
            "Only {} added; orders are limited to {MAX_QUANTITY_PER_ORDER} per item",
            outcome.added
        )
    })
}

/// Current cart.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let store = CartStore::load(session).await;
    Ok(Json(store.view(state.catalog()).await?))
}

/// Add a product selection.
///
/// The selection must fit the product's options and the product must have
/// stock for it; quantities are then clamped by the cart.
#[instrument(skip(state, session, request), fields(product_id = %request.product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<AddRequest>,
) -> Result<Json<AddResponse>> {
    let product = state
        .catalog()
        .products_by_ids(std::slice::from_ref(&request.product_id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Product {}", request.product_id)))?;

    product.validate_selection(&request.options)?;
    if !product.can_fulfil(&request.options, 1) {
        return Err(AppError::OutOfStock(product.name));
    }

    let mut store = CartStore::load(session).await;
    let outcome = store
        .add(&request.product_id, request.quantity, request.options)
        .await;

    add_breadcrumb(
        "cart",
        "Added to cart",
        &[("product_id", request.product_id.as_str())],
    );
    tracing::info!(
        requested = outcome.requested,
        added = outcome.added,
        quantity = outcome.quantity,
        "Cart add"
    );

    Ok(Json(AddResponse {
        message: clamp_message(&outcome),
        outcome,
        cart: store.view(state.catalog()).await?,
    }))
}

/// Set a line's quantity; zero removes it.
#[instrument(skip(state, session, request), fields(key = %request.key))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<CartView>> {
    let mut store = CartStore::load(session).await;
    store
        .update_quantity(&request.key, request.quantity)
        .await
        .ok_or_else(|| AppError::NotFound("Cart item".to_string()))?;
    Ok(Json(store.view(state.catalog()).await?))
}

/// Remove a line. Removing an absent line succeeds.
#[instrument(skip(state, session, request), fields(key = %request.key))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RemoveRequest>,
) -> Result<Json<CartView>> {
    let mut store = CartStore::load(session).await;
    store.remove(&request.key).await;
    Ok(Json(store.view(state.catalog()).await?))
}

/// Empty the cart.
#[instrument(skip(state, session))]
pub async fn clear(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let mut store = CartStore::load(session).await;
    store.clear().await;
    Ok(Json(store.view(state.catalog()).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn outcome(requested: u32, added: u32) -> AddOutcome {
        AddOutcome {
            requested,
            added,
            quantity: added,
            fully_added: requested == added,
        }
    }

    #[test]
    fn test_clamp_message() {
        assert_eq!(clamp_message(&outcome(2, 2)), None);
        assert_eq!(clamp_message(&outcome(0, 0)), None);
        assert_eq!(
            clamp_message(&outcome(4, 2)).as_deref(),
            Some("Only 2 added; orders are limited to 5 per item")
        );
        assert!(clamp_message(&outcome(1, 0)).unwrap().contains("maximum of 5"));
    }

    #[test]
    fn test_add_request_defaults() {
        let request: AddRequest = serde_json::from_str(r#"{"productId": "beans"}"#).unwrap();
        assert_eq!(request.quantity, 1);
        assert!(request.options.is_empty());
    }
}
