//! Product reviews.
//!
//! Shoppers submit reviews which land in the CMS unapproved. Only approved
//! reviews are ever shown on a product page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Email, EmailError, ProductId, ReviewId};

/// Maximum review body length in characters.
pub const MAX_COMMENT_LENGTH: usize = 2000;
/// Maximum author display name length in characters.
pub const MAX_AUTHOR_NAME_LENGTH: usize = 100;
/// Maximum review title length in characters.
pub const MAX_TITLE_LENGTH: usize = 150;

/// Review validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReviewValidationError {
    #[error("rating must be between 1 and 5")]
    RatingOutOfRange,
    #[error("product is required")]
    MissingProduct,
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}

/// Star rating, 1 through 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Parse a rating.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewValidationError::RatingOutOfRange`] outside `1..=5`.
    pub fn new(value: i64) -> Result<Self, ReviewValidationError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(ReviewValidationError::RatingOutOfRange)
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ReviewValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// Raw review form as posted by a shopper.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    pub product_id: String,
    pub rating: i64,
    pub comment: String,
    pub author_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl ReviewSubmission {
    /// Validate and normalize the submission.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReviewValidationError`] encountered.
    pub fn validate(self) -> Result<NewReview, ReviewValidationError> {
        let product_id = self.product_id.trim();
        if product_id.is_empty() {
            return Err(ReviewValidationError::MissingProduct);
        }

        let rating = Rating::new(self.rating)?;
        let comment = required("comment", &self.comment, MAX_COMMENT_LENGTH)?;
        let author_name = required("authorName", &self.author_name, MAX_AUTHOR_NAME_LENGTH)?;
        let title = optional("title", self.title.as_deref(), MAX_TITLE_LENGTH)?;
        let author_email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(Email::parse)
            .transpose()?;

        Ok(NewReview {
            product_id: ProductId::new(product_id),
            rating,
            title,
            comment,
            author_name,
            author_email,
        })
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ReviewValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ReviewValidationError::Required { field });
    }
    if value.chars().count() > max {
        return Err(ReviewValidationError::TooLong { field, max });
    }
    Ok(value.to_owned())
}

fn optional(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ReviewValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ReviewValidationError::TooLong { field, max }),
        Some(v) => Ok(Some(v.to_owned())),
    }
}

/// A validated review ready to be stored (unapproved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub product_id: ProductId,
    pub rating: Rating,
    pub title: Option<String>,
    pub comment: String,
    pub author_name: String,
    pub author_email: Option<Email>,
}

/// A published review as shown on a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub rating: Rating,
    pub title: Option<String>,
    pub comment: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn submission() -> ReviewSubmission {
        ReviewSubmission {
            product_id: "beans-1".to_owned(),
            rating: 5,
            comment: "  Bright and juicy.  ".to_owned(),
            author_name: "Sam".to_owned(),
            title: Some(String::new()),
            email: None,
        }
    }

    #[test]
    fn test_valid_submission_is_normalized() {
        let review = submission().validate().unwrap();
        assert_eq!(review.comment, "Bright and juicy.");
        assert_eq!(review.title, None);
        assert_eq!(review.rating.value(), 5);
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(1).is_ok());
        assert!(Rating::new(5).is_ok());
        assert_eq!(Rating::new(0), Err(ReviewValidationError::RatingOutOfRange));
        assert_eq!(Rating::new(6), Err(ReviewValidationError::RatingOutOfRange));
        assert_eq!(Rating::new(-1), Err(ReviewValidationError::RatingOutOfRange));
    }

    #[test]
    fn test_required_fields() {
        let mut s = submission();
        s.author_name = "  ".to_owned();
        assert_eq!(
            s.validate(),
            Err(ReviewValidationError::Required { field: "authorName" })
        );

        let mut s = submission();
        s.product_id = String::new();
        assert_eq!(s.validate(), Err(ReviewValidationError::MissingProduct));
    }

    #[test]
    fn test_comment_too_long() {
        let mut s = submission();
        s.comment = "x".repeat(MAX_COMMENT_LENGTH + 1);
        assert!(matches!(
            s.validate(),
            Err(ReviewValidationError::TooLong { field: "comment", .. })
        ));
    }

    #[test]
    fn test_optional_email_is_validated() {
        let mut s = submission();
        s.email = Some("not-an-email".to_owned());
        assert!(matches!(
            s.validate(),
            Err(ReviewValidationError::InvalidEmail(_))
        ));

        let mut s = submission();
        s.email = Some("sam@example.com".to_owned());
        assert!(s.validate().unwrap().author_email.is_some());
    }
}
