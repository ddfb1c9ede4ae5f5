//! Core types for the store directory.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod geo;
pub mod id;
pub mod rating;
pub mod slug;

pub use email::{Email, EmailError};
pub use geo::{EARTH_RADIUS_METERS, GeoError, GeoPoint};
pub use id::*;
pub use rating::{Rating, RatingError};
pub use slug::Slug;
