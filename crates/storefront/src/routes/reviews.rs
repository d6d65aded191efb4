//! Review submission handler.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::instrument;

use roastery_core::{ReviewId, ReviewSubmission};

use crate::error::Result;
use crate::middleware::rate_limit::ClientIp;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedReview {
    pub id: ReviewId,
    pub message: &'static str,
}

/// Accept a review for moderation.
#[instrument(skip(state, submission), fields(client = %client))]
pub async fn submit(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    Json(submission): Json<ReviewSubmission>,
) -> Result<(StatusCode, Json<SubmittedReview>)> {
    let id = state.reviews().submit(client, submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmittedReview {
            id,
            message: "Thanks! Your review will appear once it has been approved.",
        }),
    ))
}
