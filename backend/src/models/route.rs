//! Route requests and normalized route results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::geo::LatLng;
use crate::api::{PointId, TargetId};

/// Travel mode passed to the routing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    Walking,
    Cycling,
    Transit,
    Driving,
}

impl Default for RoutingMode {
    fn default() -> Self {
        Self::Walking
    }
}

impl FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "walking" | "walk" | "foot" => Ok(Self::Walking),
            "cycling" | "bike" | "bicycle" => Ok(Self::Cycling),
            "transit" | "public_transport" | "pt" => Ok(Self::Transit),
            "driving" | "car" => Ok(Self::Driving),
            _ => Err(format!("Unknown routing mode: {}", s)),
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Walking => "walking",
            Self::Cycling => "cycling",
            Self::Transit => "transit",
            Self::Driving => "driving",
        };
        f.write_str(s)
    }
}

/// Cache key: one entry per (point, target, mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub point: PointId,
    pub target: TargetId,
    pub mode: RoutingMode,
}

impl RouteKey {
    pub fn new(point: PointId, target: TargetId, mode: RoutingMode) -> Self {
        Self {
            point,
            target,
            mode,
        }
    }
}

/// Request sent across the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: LatLng,
    pub destination: LatLng,
    pub mode: RoutingMode,
}

/// Raw provider answer for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteCost {
    pub cost_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

impl RouteCost {
    pub fn new(cost_seconds: f64) -> Self {
        Self {
            cost_seconds,
            distance_meters: None,
        }
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.distance_meters = Some(meters);
        self
    }

    /// A usable cost is finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.cost_seconds.is_finite() && self.cost_seconds >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Reachable,
    Unreachable,
    Pending,
    Failed,
}

/// Normalized travel cost between one population point and one target.
///
/// `cost` is travel time in seconds and is present iff `status` is `Reachable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub population_point_id: PointId,
    pub target_id: TargetId,
    pub mode: RoutingMode,
    pub status: RouteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Route-service generation the result was produced under.
    pub generation: u64,
}

impl RouteResult {
    fn with_status(key: RouteKey, status: RouteStatus, cost: Option<f64>, generation: u64) -> Self {
        Self {
            population_point_id: key.point,
            target_id: key.target,
            mode: key.mode,
            status,
            cost,
            generation,
        }
    }

    pub fn reachable(key: RouteKey, cost: f64, generation: u64) -> Self {
        Self::with_status(key, RouteStatus::Reachable, Some(cost), generation)
    }

    pub fn unreachable(key: RouteKey, generation: u64) -> Self {
        Self::with_status(key, RouteStatus::Unreachable, None, generation)
    }

    pub fn pending(key: RouteKey, generation: u64) -> Self {
        Self::with_status(key, RouteStatus::Pending, None, generation)
    }

    pub fn failed(key: RouteKey, generation: u64) -> Self {
        Self::with_status(key, RouteStatus::Failed, None, generation)
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.population_point_id, self.target_id, self.mode)
    }

    /// Travel cost if, and only if, the pair is reachable.
    pub fn reachable_cost(&self) -> Option<f64> {
        match self.status {
            RouteStatus::Reachable => self.cost,
            _ => None,
        }
    }

    /// Whether the result is a final answer worth caching.
    pub fn is_definitive(&self) -> bool {
        matches!(self.status, RouteStatus::Reachable | RouteStatus::Unreachable)
    }

    /// Same result re-stamped for another generation (cache hits).
    pub fn restamped(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}
