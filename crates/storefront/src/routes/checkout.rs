//! Checkout handlers.
//!
//! Checkout is built from the session cart, never from client-supplied
//! prices. The cart is only cleared once the processor reports the session
//! paid, so an abandoned payment page leaves it intact.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use roastery_core::CheckoutSessionId;

use crate::error::{Result, add_breadcrumb};
use crate::services::cart::CartStore;
use crate::services::checkout::CheckoutItem;
use crate::state::AppState;
use crate::stripe::CreatedSession;

/// Open a hosted payment session for the current cart.
#[instrument(skip(state, session))]
pub async fn create(State(state): State<AppState>, session: Session) -> Result<Json<CreatedSession>> {
    let store = CartStore::load(session).await;
    let items: Vec<CheckoutItem> = store.cart().lines().iter().map(CheckoutItem::from).collect();

    let created = state.checkout().create_session(&items).await?;

    add_breadcrumb(
        "checkout",
        "Checkout session created",
        &[("session_id", created.session_id.as_str())],
    );
    tracing::info!(session_id = %created.session_id, "Checkout session created");
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: CheckoutSessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStatus {
    pub session_id: CheckoutSessionId,
    pub paid: bool,
    pub cart_cleared: bool,
}

/// Return from the hosted payment page.
#[instrument(skip(state, session, query), fields(session_id = %query.session_id))]
pub async fn success(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SuccessQuery>,
) -> Result<Json<CheckoutStatus>> {
    let checkout = state.checkout().retrieve_session(&query.session_id).await?;
    let paid = checkout.is_paid();

    if paid {
        let mut store = CartStore::load(session).await;
        store.clear().await;
        tracing::info!("Payment confirmed, cart cleared");
    } else {
        tracing::info!(payment_status = ?checkout.payment_status, "Session not paid yet, keeping cart");
    }

    Ok(Json(CheckoutStatus {
        session_id: query.session_id,
        paid,
        cart_cleared: paid,
    }))
}
