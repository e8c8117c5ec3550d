//! Route service and routing providers.
//!
//! - [`RoutingProvider`]: async boundary to whatever computes travel costs
//! - [`RouteService`]: batching, concurrency limits, caching and cancellation
//! - [`StraightLineProvider`]: offline great-circle estimate
//! - `OsrmProvider`: HTTP provider (feature `http-provider`)

use std::sync::Arc;

use crate::config::{ProviderKind, RoutingSettings};
use crate::error::{ConfigError, ErrorContext};

pub mod cache;
#[cfg(feature = "http-provider")]
pub mod osrm;
pub mod provider;
pub mod service;
pub mod straight_line;

pub use cache::RouteCache;
#[cfg(feature = "http-provider")]
pub use osrm::OsrmProvider;
pub use provider::RoutingProvider;
pub use service::{RouteOptions, RouteService};
pub use straight_line::StraightLineProvider;

/// Create the provider selected in the routing settings.
///
/// # Returns
/// * `Ok(Arc<dyn RoutingProvider>)` - provider instance
/// * `Err(ConfigError)` - if the provider cannot be built or its feature is disabled
pub fn build_provider(settings: &RoutingSettings) -> Result<Arc<dyn RoutingProvider>, ConfigError> {
    match settings.provider {
        ProviderKind::StraightLine => Ok(Arc::new(StraightLineProvider::from_settings(settings))),
        ProviderKind::Osrm => {
            #[cfg(feature = "http-provider")]
            {
                let provider = OsrmProvider::new(settings.osrm_url.clone(), settings.timeout_ms)?;
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "http-provider"))]
            {
                Err(ConfigError::with_context(
                    "OSRM provider requires the http-provider feature",
                    ErrorContext::new("build_provider").with_entity("osrm"),
                ))
            }
        }
    }
}
