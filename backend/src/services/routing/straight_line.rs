//! Great-circle routing: distance over a per-mode travel speed.

use async_trait::async_trait;

use super::provider::RoutingProvider;
use crate::config::{RoutingSettings, SpeedSettings};
use crate::error::ProviderError;
use crate::models::{haversine_distance, RouteCost, RouteRequest};

/// Deterministic offline provider.
#[derive(Debug, Clone, Default)]
pub struct StraightLineProvider {
    speeds: SpeedSettings,
    max_distance_meters: Option<f64>,
}

impl StraightLineProvider {
    pub fn new(speeds: SpeedSettings) -> Self {
        Self {
            speeds,
            max_distance_meters: None,
        }
    }

    /// Pairs farther apart than `meters` have no route.
    pub fn with_max_distance(mut self, meters: f64) -> Self {
        self.max_distance_meters = Some(meters);
        self
    }

    pub fn from_settings(settings: &RoutingSettings) -> Self {
        Self {
            speeds: settings.speeds.clone(),
            max_distance_meters: settings.max_distance_meters,
        }
    }
}

#[async_trait]
impl RoutingProvider for StraightLineProvider {
    fn name(&self) -> &str {
        "straight_line"
    }

    async fn route(&self, request: &RouteRequest) -> Result<RouteCost, ProviderError> {
        let distance = haversine_distance(request.origin, request.destination);
        if self.max_distance_meters.is_some_and(|max| distance > max) {
            return Err(ProviderError::NoRoute);
        }

        let speed = self.speeds.speed_for(request.mode);
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ProviderError::InvalidResponse(format!(
                "no usable speed for {} (got {})",
                request.mode, speed
            )));
        }
        Ok(RouteCost::new(distance / speed).with_distance(distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LatLng, RoutingMode};

    fn request(mode: RoutingMode) -> RouteRequest {
        RouteRequest {
            origin: LatLng::new(0.0, 0.0),
            destination: LatLng::new(0.01, 0.0),
            mode,
        }
    }

    #[tokio::test]
    async fn test_cost_is_distance_over_speed() {
        let provider = StraightLineProvider::default();
        let walking = provider.route(&request(RoutingMode::Walking)).await.unwrap();
        let driving = provider.route(&request(RoutingMode::Driving)).await.unwrap();

        let distance = walking.distance_meters.unwrap();
        assert!((distance - 1111.95).abs() < 0.1);
        assert!((walking.cost_seconds - distance / 1.4).abs() < 1e-9);
        assert!((driving.cost_seconds - distance / 11.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_max_distance_means_no_route() {
        let provider = StraightLineProvider::default().with_max_distance(500.0);
        let err = provider.route(&request(RoutingMode::Walking)).await.unwrap_err();
        assert_eq!(err, ProviderError::NoRoute);
    }

    #[tokio::test]
    async fn test_zero_speed_is_invalid() {
        let speeds = SpeedSettings {
            transit: 0.0,
            ..SpeedSettings::default()
        };
        let provider = StraightLineProvider::new(speeds);
        let err = provider.route(&request(RoutingMode::Transit)).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
