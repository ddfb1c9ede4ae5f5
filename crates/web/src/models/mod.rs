//! Domain models for the store directory.
//!
//! These types represent validated domain objects separate from database row
//! types. Row mapping lives in `crate::db`.

pub mod review;
pub mod session;
pub mod store;
pub mod user;

pub use review::{NewReview, Review, ReviewView};
pub use session::{CurrentUser, keys as session_keys};
pub use store::{
    NearbyStore, SearchHit, Store, StoreDetail, StoreDraft, StoreLocation, TAG_CHOICES, TagCount,
    TopStore,
};
pub use user::{PasswordReset, User};
