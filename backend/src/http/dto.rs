//! Data Transfer Objects for the HTTP API.
//!
//! Domain types (`Target`, `AggregationResult`, `PopulationLoad`,
//! `DistributionConfig`, `BatchRecord`) already derive Serialize/Deserialize
//! and are used directly; this module holds the request and response
//! wrappers around them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use crate::api::{AggregationResult, DistributionConfig, PopulationLoad, Target};
pub use crate::services::BatchRecord;

use crate::api::{LatLng, RoutingMode, TargetId};

/// Request body for adding a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTargetRequest {
    pub id: TargetId,
    pub lat: f64,
    #[serde(alias = "lng")]
    pub lon: f64,
    pub category: String,
    /// Free-form attributes such as name or address
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl From<CreateTargetRequest> for Target {
    fn from(request: CreateTargetRequest) -> Self {
        let mut target = Target::new(
            request.id,
            LatLng::new(request.lat, request.lon),
            request.category,
        );
        target.metadata = request.metadata;
        target
    }
}

/// Target list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetListResponse {
    /// Targets ordered by id
    pub targets: Vec<Target>,
    /// Total count
    pub total: usize,
}

/// Request body for changing the selection.
///
/// `target_ids` and `category` are mutually exclusive; `mode` may accompany
/// either or come alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionRequest {
    #[serde(default)]
    pub target_ids: Option<Vec<TargetId>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub mode: Option<RoutingMode>,
}

/// Response for a started refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// Route generation the refresh runs under
    pub generation: u64,
    /// Message about the operation
    pub message: String,
}

/// Query parameters for the aggregation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationQuery {
    /// Include per-point costs (default: true)
    #[serde(default = "default_true")]
    pub include_points: bool,
}

impl Default for AggregationQuery {
    fn default() -> Self {
        Self {
            include_points: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Active routing provider
    pub provider: String,
    /// Number of loaded population points
    pub population: usize,
    /// Number of known targets
    pub targets: usize,
}
