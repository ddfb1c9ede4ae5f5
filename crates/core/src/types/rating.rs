//! Review star ratings.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Rating`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RatingError {
    /// Value outside the 1..=5 star range.
    #[error("rating must be between {min} and {max} (got {0})", min = Rating::MIN, max = Rating::MAX)]
    OutOfRange(i64),
}

/// A review rating of one to five stars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i16")]
pub struct Rating(u8);

impl Rating {
    /// Lowest allowed rating.
    pub const MIN: u8 = 1;
    /// Highest allowed rating.
    pub const MAX: u8 = 5;

    /// Create a rating from a star count.
    ///
    /// # Errors
    ///
    /// Returns `RatingError::OutOfRange` unless `1 <= stars <= 5`.
    pub fn new(stars: i64) -> Result<Self, RatingError> {
        u8::try_from(stars)
            .ok()
            .filter(|s| (Self::MIN..=Self::MAX).contains(s))
            .map(Self)
            .ok_or(RatingError::OutOfRange(stars))
    }

    /// Number of stars.
    #[must_use]
    pub const fn stars(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for i16 {
    fn from(rating: Rating) -> Self {
        Self::from(rating.0)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range() {
        for stars in 1..=5 {
            assert_eq!(i64::from(Rating::new(stars).unwrap().stars()), stars);
        }
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(Rating::new(0), Err(RatingError::OutOfRange(0)));
        assert_eq!(Rating::new(6), Err(RatingError::OutOfRange(6)));
        assert_eq!(Rating::new(-3), Err(RatingError::OutOfRange(-3)));
        assert_eq!(Rating::new(1_000), Err(RatingError::OutOfRange(1_000)));
    }

    #[test]
    fn test_serde() {
        let rating: Rating = serde_json::from_str("4").unwrap();
        assert_eq!(rating.stars(), 4);
        assert_eq!(serde_json::to_string(&rating).unwrap(), "4");
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }
}
