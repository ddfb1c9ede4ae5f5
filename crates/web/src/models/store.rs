//! Store listing domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use storedir_core::{GeoPoint, Slug, StoreId, UserId};

use super::review::ReviewView;

/// Tags offered as checkboxes on the store form.
pub const TAG_CHOICES: &[&str] = &[
    "Wifi",
    "Open Late",
    "Family Friendly",
    "Vegetarian",
    "Licensed",
];

/// Where a store is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreLocation {
    /// Coordinates, always a GeoJSON `Point`.
    #[serde(flatten)]
    pub point: GeoPoint,
    /// Street address as typed by the author.
    pub address: String,
}

/// A store listing (domain type).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub location: StoreLocation,
    /// Uploaded photo filenames, oldest first.
    pub photos: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub author: UserId,
}

impl Store {
    /// The most recently uploaded photo, used as the cover image.
    #[must_use]
    pub fn cover_photo(&self) -> Option<&str> {
        self.photos.last().map(String::as_str)
    }

    /// Public URL of the cover image, or the placeholder.
    #[must_use]
    pub fn cover_photo_url(&self) -> String {
        self.cover_photo().map_or_else(
            || "/static/images/store.png".to_string(),
            |photo| format!("/uploads/{photo}"),
        )
    }

    /// Whether `user` may edit this store.
    #[must_use]
    pub fn is_authored_by(&self, user: UserId) -> bool {
        self.author == user
    }

    /// Whether the store carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Validated store input from the create/edit form.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDraft {
    pub name: String,
    pub description: String,
    pub location: StoreLocation,
    pub tags: Vec<String>,
    /// Newly uploaded photo, appended to the store's photos.
    pub photo: Option<String>,
}

/// A store with its author and reviews attached.
#[derive(Debug, Clone)]
pub struct StoreDetail {
    pub store: Store,
    pub author_name: String,
    pub reviews: Vec<ReviewView>,
}

impl StoreDetail {
    /// Mean rating, if the store has any reviews.
    #[must_use]
    pub fn average_rating(&self) -> Option<f64> {
        if self.reviews.is_empty() {
            return None;
        }
        let total: u32 = self
            .reviews
            .iter()
            .map(|r| u32::from(r.review.rating.stars()))
            .sum();
        #[allow(clippy::cast_precision_loss)] // review counts are tiny
        let count = self.reviews.len() as f64;
        Some(f64::from(total) / count)
    }
}

/// A tag and how many stores carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// A full-text search match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: StoreId,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    /// Relevance; higher is better.
    pub score: f32,
}

/// A store near a point, projected for the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyStore {
    pub id: StoreId,
    pub slug: Slug,
    pub name: String,
    pub description: String,
    pub location: StoreLocation,
    pub photo: Option<String>,
    /// Metres from the query point.
    pub distance: f64,
}

/// A store ranked by its reviews.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopStore {
    pub id: StoreId,
    pub name: String,
    pub slug: Slug,
    pub photo: Option<String>,
    pub review_count: i64,
    pub average_rating: f64,
}

impl TopStore {
    /// Public URL of the cover image, or the placeholder.
    #[must_use]
    pub fn photo_url(&self) -> String {
        self.photo.as_deref().map_or_else(
            || "/static/images/store.png".to_string(),
            |photo| format!("/uploads/{photo}"),
        )
    }

    /// Average rating rounded to one decimal for display.
    #[must_use]
    pub fn rounded_rating(&self) -> String {
        format!("{:.1}", self.average_rating)
    }
}
