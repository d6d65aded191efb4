//! Integration tests for review intake and product pages.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use roastery_core::review::ReviewValidationError;
use roastery_core::{ProductId, Rating, Review, ReviewId, ReviewSubmission};
use roastery_integration_tests::client;
use roastery_storefront::middleware::ReviewRateLimiter;
use roastery_storefront::services::{Catalog, ReviewError, ReviewService};
use roastery_storefront::testing::{MemoryReviewStore, TestCatalog, product};
use rust_decimal::Decimal;

fn submission(comment: &str) -> ReviewSubmission {
    ReviewSubmission {
        product_id: "espresso".to_owned(),
        rating: 4,
        comment: comment.to_owned(),
        author_name: "Grace".to_owned(),
        title: Some("  Great crema  ".to_owned()),
        email: None,
    }
}

fn service(store: &MemoryReviewStore) -> ReviewService<MemoryReviewStore> {
    ReviewService::new(
        store.clone(),
        ReviewRateLimiter::new(5, Duration::from_secs(60 * 60)),
    )
}

#[tokio::test]
async fn test_reviews_are_stored_normalized() {
    let store = MemoryReviewStore::default();
    let id = service(&store)
        .submit(client(1), submission("Smooth and nutty"))
        .await
        .unwrap();

    assert_eq!(id, ReviewId::new("review-1"));
    let stored = &store.reviews()[0];
    assert_eq!(stored.product_id, ProductId::new("espresso"));
    assert_eq!(stored.title.as_deref(), Some("Great crema"));
    assert_eq!(stored.rating.value(), 4);
}

#[tokio::test]
async fn test_sixth_submission_in_an_hour_is_limited() {
    let store = MemoryReviewStore::default();
    let reviews = service(&store);

    for n in 0..5 {
        reviews
            .submit(client(2), submission(&format!("Bag {n}")))
            .await
            .unwrap();
    }

    let err = reviews
        .submit(client(2), submission("One more"))
        .await
        .unwrap_err();
    let ReviewError::RateLimited(limit) = err else {
        panic!("expected rate limit, got {err:?}");
    };
    assert!(limit.retry_after > Duration::ZERO);
    assert!(limit.retry_after <= Duration::from_secs(60 * 60));
    assert_eq!(store.reviews().len(), 5);

    // Other addresses are unaffected
    reviews.submit(client(3), submission("Fresh")).await.unwrap();
}

#[tokio::test]
async fn test_invalid_submissions_count_against_the_limit() {
    let store = MemoryReviewStore::default();
    let reviews = service(&store);

    for _ in 0..5 {
        let err = reviews.submit(client(4), submission("   ")).await.unwrap_err();
        assert!(matches!(
            err,
            ReviewError::Invalid(ReviewValidationError::Required { field: "comment" })
        ));
    }

    let err = reviews.submit(client(4), submission("Valid now")).await.unwrap_err();
    assert!(matches!(err, ReviewError::RateLimited(_)));
    assert!(store.reviews().is_empty());
}

#[tokio::test]
async fn test_product_page_lists_approved_reviews() {
    let catalog = TestCatalog::default();
    catalog.insert(product("espresso", Decimal::new(1850, 2)));
    catalog.insert_review(
        &ProductId::new("espresso"),
        Review {
            id: ReviewId::new("r1"),
            rating: Rating::new(5).unwrap(),
            title: None,
            comment: "Best beans in town".to_owned(),
            author_name: "Sam".to_owned(),
            created_at: chrono::Utc::now(),
        },
    );

    let page = catalog.product_by_slug("espresso").await.unwrap().unwrap();
    assert_eq!(page.product.id, ProductId::new("espresso"));
    assert_eq!(page.reviews.len(), 1);

    assert!(catalog.product_by_slug("missing").await.unwrap().is_none());
}
