//! Geographic primitives shared by every other component.
//!
//! Distances are in meters on a spherical Earth; coordinates are decimal
//! degrees (WGS84 latitude/longitude).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius (IUGG) in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Latitude limit of the Web-Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude (-90 to 90)
    pub lat: f64,
    /// Longitude (-180 to 180)
    pub lon: f64,
}

impl LatLng {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build a coordinate, rejecting out-of-range or non-finite values.
    pub fn validated(lat: f64, lon: f64) -> Result<Self, ValidationError> {
        validate_coordinates(lat, lon)?;
        Ok(Self { lat, lon })
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        haversine_distance(*self, *other)
    }

    pub fn is_valid(&self) -> bool {
        validate_coordinates(self.lat, self.lon).is_ok()
    }
}

/// Reject latitude outside [-90, 90], longitude outside [-180, 180], and NaN/inf.
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), ValidationError> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(ValidationError::new(format!(
            "Coordinates must be finite (lat={}, lon={})",
            lat, lon
        )));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::new(format!(
            "Latitude must be between -90 and 90 degrees (got {})",
            lat
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::new(format!(
            "Longitude must be between -180 and 180 degrees (got {})",
            lon
        )));
    }
    Ok(())
}

/// Haversine great-circle distance in meters.
pub fn haversine_distance(a: LatLng, b: LatLng) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards against h drifting just above 1.0 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// Project to Web-Mercator (EPSG:3857) meters, clamping latitude to the
/// projection's valid band.
pub fn to_web_mercator(p: LatLng) -> (f64, f64) {
    let lat = p.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = EARTH_RADIUS_M * p.lon.to_radians();
    let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();
    (x, y)
}

/// Axis-aligned latitude/longitude box. Does not handle antimeridian wrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Degenerate box containing a single point.
    pub fn from_point(p: LatLng) -> Self {
        Self::new(p.lat, p.lon, p.lat, p.lon)
    }

    /// Smallest box containing every point, or `None` for an empty input.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LatLng>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::from_point(first);
        for p in iter {
            bbox.extend(p);
        }
        Some(bbox)
    }

    pub fn extend(&mut self, p: LatLng) {
        self.min_lat = self.min_lat.min(p.lat);
        self.min_lon = self.min_lon.min(p.lon);
        self.max_lat = self.max_lat.max(p.lat);
        self.max_lon = self.max_lon.max(p.lon);
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}
