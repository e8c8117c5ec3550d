//! Routing provider boundary.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{RouteCost, RouteRequest};

/// Source of travel costs between two locations.
///
/// Implementations answer one request at a time; batching, caching, retries
/// and cancellation are handled by [`super::RouteService`].
///
/// # Thread Safety
/// Implementations must be `Send + Sync` so a single provider can serve
/// concurrent requests.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Route one origin/destination pair.
    ///
    /// # Returns
    /// * `Ok(RouteCost)` - travel time in seconds (and distance when known)
    /// * `Err(ProviderError::NoRoute)` - the pair is not connected in this mode
    /// * `Err(ProviderError)` - any other failure
    async fn route(&self, request: &RouteRequest) -> Result<RouteCost, ProviderError>;
}
