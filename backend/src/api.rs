//! Public API surface of the accessibility core.
//!
//! This file consolidates identifiers and the data types exchanged with the
//! visualization layer. All types derive Serialize/Deserialize for JSON.

use crate::define_id_type;

define_id_type!(i64, PointId);
define_id_type!(i64, TargetId);

pub use crate::models::{
    AggregationResult, BoundingBox, BucketKind, CostStats, DistributionBucket, LatLng, PointCost,
    PopulationPoint, PopulationRecord, RouteCost, RouteKey, RouteRequest, RouteResult, RouteStatus,
    RoutingMode, Target, TargetChange,
};
pub use crate::services::distribution::{BucketSpec, DistributionConfig};
pub use crate::services::population::PopulationLoad;
