//! OSRM-compatible HTTP routing provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::RoutingProvider;
use crate::error::{ConfigError, ErrorContext, ProviderError};
use crate::models::{RouteCost, RouteRequest, RoutingMode};

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    duration: f64,
    #[serde(default)]
    distance: Option<f64>,
}

/// OSRM profile for a mode. Transit has none.
fn profile(mode: RoutingMode) -> Option<&'static str> {
    match mode {
        RoutingMode::Walking => Some("foot"),
        RoutingMode::Cycling => Some("bike"),
        RoutingMode::Driving => Some("car"),
        RoutingMode::Transit => None,
    }
}

fn route_url(base_url: &str, request: &RouteRequest) -> Option<String> {
    let profile = profile(request.mode)?;
    Some(format!(
        "{}/route/v1/{}/{},{};{},{}?overview=false",
        base_url.trim_end_matches('/'),
        profile,
        request.origin.lon,
        request.origin.lat,
        request.destination.lon,
        request.destination.lat
    ))
}

fn parse_response(body: &str) -> Result<RouteCost, ProviderError> {
    let response: OsrmResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed OSRM body: {}", e)))?;

    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(ProviderError::NoRoute),
        other => {
            return Err(ProviderError::InvalidResponse(format!(
                "OSRM returned {}: {}",
                other,
                response.message.unwrap_or_default()
            )))
        }
    }

    let route = response.routes.first().ok_or(ProviderError::NoRoute)?;
    let cost = RouteCost::new(route.duration);
    Ok(match route.distance {
        Some(distance) => cost.with_distance(distance),
        None => cost,
    })
}

/// Statuses worth retrying: server errors and rate limiting.
fn transient_status(status: reqwest::StatusCode) -> Option<ProviderError> {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Some(ProviderError::Network(format!("OSRM answered {}", status)))
    } else {
        None
    }
}

pub struct OsrmProvider {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl OsrmProvider {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| {
                ConfigError::with_context(
                    format!("Failed to build HTTP client: {}", e),
                    ErrorContext::new("build_provider").with_entity("osrm"),
                )
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout_ms,
        })
    }
}

#[async_trait]
impl RoutingProvider for OsrmProvider {
    fn name(&self) -> &str {
        "osrm"
    }

    async fn route(&self, request: &RouteRequest) -> Result<RouteCost, ProviderError> {
        let Some(url) = route_url(&self.base_url, request) else {
            return Err(ProviderError::NoRoute);
        };

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    millis: self.timeout_ms,
                }
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        if let Some(e) = transient_status(response.status()) {
            return Err(e);
        }
        // Client errors still carry an OSRM body with a code worth reading.
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        parse_response(&body)
    }
}
