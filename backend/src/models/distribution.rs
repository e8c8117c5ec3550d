//! Aggregated, population-weighted views handed to the visualization layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::geo::LatLng;
use super::route::RoutingMode;
use crate::api::{PointId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// Regular `[range_start, range_end)` bucket (the last one is closed).
    Range,
    /// Costs above the configured cutoff; `range_end` is `+inf`.
    Overflow,
}

/// One histogram bar: population weight whose effective cost falls in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub range_start: f64,
    /// `+inf` for the overflow bucket (serialized as `null`).
    #[serde(with = "unbounded")]
    pub range_end: f64,
    pub kind: BucketKind,
    pub total_weight: f64,
    /// Number of points, independent of weight.
    pub count: usize,
}

/// JSON has no infinity: `+inf` travels as `null` and comes back as `+inf`.
mod unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

impl DistributionBucket {
    pub fn range(range_start: f64, range_end: f64) -> Self {
        Self {
            range_start,
            range_end,
            kind: BucketKind::Range,
            total_weight: 0.0,
            count: 0,
        }
    }

    pub fn overflow(range_start: f64) -> Self {
        Self {
            range_start,
            range_end: f64::INFINITY,
            kind: BucketKind::Overflow,
            total_weight: 0.0,
            count: 0,
        }
    }

    pub fn is_overflow(&self) -> bool {
        self.kind == BucketKind::Overflow
    }

    pub(crate) fn add(&mut self, weight: f64) {
        self.total_weight += weight;
        self.count += 1;
    }
}

/// Population-weighted summary of reachable costs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostStats {
    pub count: usize,
    pub total_weight: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Effective cost of a single point, for per-point map coloring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCost {
    pub point_id: PointId,
    pub location: LatLng,
    pub weight: f64,
    /// `None` when no selected target is reachable (yet).
    pub cost: Option<f64>,
    pub nearest_target: Option<TargetId>,
}

/// Derived distribution for one target selection. Never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub target_selection: BTreeSet<TargetId>,
    pub mode: RoutingMode,
    pub buckets: Vec<DistributionBucket>,
    pub unreachable_weight: f64,
    pub unreachable_count: usize,
    /// Sum of all point weights, reachable or not.
    pub total_weight: f64,
    pub stats: CostStats,
    pub point_costs: Vec<PointCost>,
    /// `false` while some selected pairs are still pending.
    pub complete: bool,
    pub pending_pairs: usize,
    pub generation: u64,
}

impl AggregationResult {
    /// The result published before anything has been computed.
    pub fn empty(mode: RoutingMode) -> Self {
        Self {
            target_selection: BTreeSet::new(),
            mode,
            buckets: Vec::new(),
            unreachable_weight: 0.0,
            unreachable_count: 0,
            total_weight: 0.0,
            stats: CostStats::default(),
            point_costs: Vec::new(),
            complete: true,
            pending_pairs: 0,
            generation: 0,
        }
    }

    /// Sum of weights placed in buckets (overflow included).
    pub fn bucketed_weight(&self) -> f64 {
        self.buckets.iter().map(|b| b.total_weight).sum()
    }

    /// Share of the population with no reachable target, in `[0, 1]`.
    pub fn unreachable_fraction(&self) -> f64 {
        if self.total_weight > 0.0 {
            self.unreachable_weight / self.total_weight
        } else {
            0.0
        }
    }
}
