//! Population points and the raw records they are loaded from.

use serde::{Deserialize, Serialize};

use super::geo::LatLng;
use crate::api::PointId;

/// A weighted population location. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationPoint {
    pub id: PointId,
    pub location: LatLng,
    /// Population count or density; finite and non-negative.
    pub weight: f64,
}

impl PopulationPoint {
    pub fn new(id: PointId, location: LatLng, weight: f64) -> Self {
        Self {
            id,
            location,
            weight,
        }
    }
}

/// Externally supplied population record, prior to validation.
///
/// Common column spellings (`latitude`, `lng`, `population`, ...) are accepted
/// as aliases so census exports can be posted without reshaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "lng", alias = "long", alias = "longitude")]
    pub lon: f64,
    #[serde(alias = "population", alias = "count")]
    pub weight: f64,
}

impl PopulationRecord {
    pub fn new(id: Option<i64>, lat: f64, lon: f64, weight: f64) -> Self {
        Self {
            id,
            lat,
            lon,
            weight,
        }
    }
}
