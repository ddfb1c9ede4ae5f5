//! Review domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use storedir_core::{Rating, ReviewId, StoreId, UserId};

/// A review left on a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub author: UserId,
    pub store: StoreId,
    pub text: String,
    pub rating: Rating,
    pub created_at: DateTime<Utc>,
}

/// A review with its author's display name, as shown on the store page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewView {
    pub review: Review,
    pub author_name: String,
}

impl ReviewView {
    /// Filled and empty stars, e.g. `★★★☆☆`.
    #[must_use]
    pub fn stars(&self) -> String {
        let filled = usize::from(self.review.rating.stars());
        let empty = usize::from(Rating::MAX) - filled;
        format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
    }
}

/// Validated review input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub text: String,
    pub rating: Rating,
}
