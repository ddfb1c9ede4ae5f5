//! Geographic coordinates.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres, as used by spherical distance queries.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Errors that can occur when building a [`GeoPoint`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// Longitude outside -180..=180.
    #[error("longitude must be between -180 and 180 (got {0})")]
    Longitude(f64),
    /// Latitude outside -90..=90.
    #[error("latitude must be between -90 and 90 (got {0})")]
    Latitude(f64),
}

/// A GeoJSON `Point`.
///
/// Serialized as `{"type": "Point", "coordinates": [lng, lat]}` so the JSON
/// API and map front-end see the same shape a geospatial store would return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPoint", into = "GeoJsonPoint")]
pub struct GeoPoint {
    lng: f64,
    lat: f64,
}

impl GeoPoint {
    /// The GeoJSON type discriminator.
    pub const TYPE: &'static str = "Point";

    /// Create a point, validating coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns `GeoError` if either coordinate is out of range or not finite.
    pub fn new(lng: f64, lat: f64) -> Result<Self, GeoError> {
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::Longitude(lng));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::Latitude(lat));
        }
        Ok(Self { lng, lat })
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Great-circle distance to `other` in metres (haversine).
    #[must_use]
    pub fn distance_meters(&self, other: &Self) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

/// Wire representation of [`GeoPoint`].
#[derive(Serialize, Deserialize)]
struct GeoJsonPoint {
    #[serde(rename = "type")]
    kind: String,
    coordinates: [f64; 2],
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            kind: GeoPoint::TYPE.to_owned(),
            coordinates: [point.lng, point.lat],
        }
    }
}

impl TryFrom<GeoJsonPoint> for GeoPoint {
    type Error = GeoError;

    fn try_from(value: GeoJsonPoint) -> Result<Self, Self::Error> {
        let [lng, lat] = value.coordinates;
        Self::new(lng, lat)
    }
}
