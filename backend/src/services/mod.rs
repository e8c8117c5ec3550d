//! Service layer.
//!
//! Population and target services own the input data, the route service talks
//! to the routing provider, and the aggregation service ties them together
//! and publishes the distribution for the current selection.

pub mod aggregation;
pub mod batch_tracker;
pub mod distribution;
pub mod population;
pub mod routing;
pub mod targets;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ConfigError;

pub use aggregation::{aggregate, aggregate_chunked, AggregationInput, AggregationService, Disposition};
pub use batch_tracker::{BatchRecord, BatchStatus, BatchTracker};
pub use distribution::{bucketize, compute_stats, weighted_percentile, BucketSpec, DistributionConfig};
pub use population::{load_population, parse_population_json, PopulationService};
pub use routing::{build_provider, RouteOptions, RouteService, RoutingProvider};
pub use targets::TargetService;

/// Wire every service from the application configuration.
///
/// The population and target sets start empty.
pub fn build_services(config: &AppConfig) -> Result<Arc<AggregationService>, ConfigError> {
    let provider = build_provider(&config.routing)?;
    log::info!(
        "Routing with {} ({} mode, batch {}, concurrency {})",
        provider.name(),
        config.routing.mode,
        config.routing.batch_size,
        config.routing.concurrency
    );
    let routes = RouteService::new(provider, config.routing.clone());
    let service = AggregationService::new(
        PopulationService::new(),
        TargetService::new(),
        routes,
        config.distribution.clone(),
        config.aggregation.clone(),
    )?;
    Ok(Arc::new(service))
}
