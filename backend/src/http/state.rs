//! Application state for the HTTP server.

use std::sync::Arc;

use crate::services::AggregationService;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator owning population, targets and routing
    pub aggregation: Arc<AggregationService>,
}

impl AppState {
    /// Create a new application state around the aggregation service.
    pub fn new(aggregation: Arc<AggregationService>) -> Self {
        Self { aggregation }
    }
}
