//! Review submission.
//!
//! Every attempt from an address counts against the rate limit, valid or not.
//! Accepted reviews are stored unapproved and only appear on product pages
//! once approved in the CMS.

use std::future::Future;
use std::net::IpAddr;

use thiserror::Error;
use tracing::instrument;

use roastery_core::review::ReviewValidationError;
use roastery_core::{NewReview, ReviewId, ReviewSubmission};

use crate::cms::CmsError;
use crate::middleware::rate_limit::{RateLimitExceeded, ReviewRateLimiter};

/// Where new reviews are written.
pub trait ReviewStore: Send + Sync {
    /// Store an unapproved review.
    fn create_review(&self, review: &NewReview) -> impl Future<Output = Result<ReviewId, CmsError>> + Send;
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error("{0}")]
    Invalid(#[from] ReviewValidationError),

    #[error("could not save review: {0}")]
    Store(#[from] CmsError),
}

impl ReviewError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::Invalid(_) => "invalid_review",
            Self::Store(_) => "review_store_error",
        }
    }
}

/// Rate-limited review intake.
pub struct ReviewService<R> {
    store: R,
    limiter: ReviewRateLimiter,
}

impl<R: ReviewStore> ReviewService<R> {
    #[must_use]
    pub const fn new(store: R, limiter: ReviewRateLimiter) -> Self {
        Self { store, limiter }
    }

    /// Accept a review from `client`.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::RateLimited`] past the per-address budget,
    /// [`ReviewError::Invalid`] for bad input, [`ReviewError::Store`] if the
    /// CMS rejects the write.
    #[instrument(skip(self, submission), fields(product_id = %submission.product_id))]
    pub async fn submit(&self, client: IpAddr, submission: ReviewSubmission) -> Result<ReviewId, ReviewError> {
        self.limiter.check(client).await?;

        let review = submission.validate()?;
        let id = self.store.create_review(&review).await?;

        tracing::info!(review_id = %id, rating = review.rating.value(), "Review submitted for approval");
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MemoryReviewStore;

    fn submission(rating: i64) -> ReviewSubmission {
        ReviewSubmission {
            product_id: "beans".to_owned(),
            rating,
            comment: "Lovely and chocolatey".to_owned(),
            author_name: "Sam".to_owned(),
            title: None,
            email: None,
        }
    }

    #[tokio::test]
    async fn test_valid_review_is_stored() {
        let store = MemoryReviewStore::default();
        let service = ReviewService::new(store.clone(), ReviewRateLimiter::default());

        service
            .submit("203.0.113.9".parse().unwrap(), submission(5))
            .await
            .unwrap();

        let reviews = store.reviews();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating.value(), 5);
    }

    #[tokio::test]
    async fn test_invalid_review_is_rejected() {
        let store = MemoryReviewStore::default();
        let service = ReviewService::new(store.clone(), ReviewRateLimiter::default());

        let err = service
            .submit("203.0.113.9".parse().unwrap(), submission(9))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_review");
        assert!(store.reviews().is_empty());
    }

    #[tokio::test]
    async fn test_sixth_attempt_is_rate_limited() {
        let store = MemoryReviewStore::default();
        let service = ReviewService::new(store.clone(), ReviewRateLimiter::default());
        let client: IpAddr = "203.0.113.9".parse().unwrap();

        for _ in 0..5 {
            service.submit(client, submission(4)).await.unwrap();
        }
        let err = service.submit(client, submission(4)).await.unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
        assert_eq!(store.reviews().len(), 5);

        service
            .submit("198.51.100.1".parse().unwrap(), submission(4))
            .await
            .unwrap();
    }
}
