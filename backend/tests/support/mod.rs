#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use accessmap::api::{LatLng, PointId, PopulationPoint, RouteCost, RouteRequest, Target, TargetId};
use accessmap::config::{AggregationSettings, RoutingSettings};
use accessmap::error::ProviderError;
use accessmap::services::{
    AggregationService, DistributionConfig, PopulationService, RouteService, RoutingProvider,
    TargetService,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Population point `id` placed at longitude `id / 1000` on the equator.
pub fn point(id: i64, weight: f64) -> PopulationPoint {
    PopulationPoint::new(PointId(id), LatLng::new(0.0, id as f64 / 1000.0), weight)
}

pub fn target(id: i64, category: &str) -> Target {
    Target::new(TargetId(id), LatLng::new(0.5, id as f64 / 1000.0), category)
}

/// Id of the point a request originates from (inverse of [`point`]).
pub fn origin_point(request: &RouteRequest) -> i64 {
    (request.origin.lon * 1000.0).round() as i64
}

/// Id of the target a request goes to (inverse of [`target`]).
pub fn destination_target(request: &RouteRequest) -> i64 {
    (request.destination.lon * 1000.0).round() as i64
}

/// Routing settings for tests: no retry delay, short timeout.
pub fn routing_settings() -> RoutingSettings {
    RoutingSettings {
        timeout_ms: 1_000,
        retry_delay_ms: 0,
        ..RoutingSettings::default()
    }
}

pub fn aggregation_service(
    provider: Arc<dyn RoutingProvider>,
    points: Vec<PopulationPoint>,
    targets: Vec<Target>,
    config: DistributionConfig,
) -> AggregationService {
    let target_service = TargetService::new();
    for t in targets {
        target_service.add_target(t).unwrap();
    }
    AggregationService::new(
        PopulationService::with_points(points),
        target_service,
        RouteService::new(provider, routing_settings()),
        config,
        AggregationSettings::default(),
    )
    .unwrap()
}

// =============================================================================
// Scripted provider
// =============================================================================

type Responder = dyn Fn(&RouteRequest, usize) -> Result<RouteCost, ProviderError> + Send + Sync;

/// Provider answering from a closure, counting calls.
///
/// The closure receives the request and the 1-based call number. With a gate,
/// every call waits for one permit before answering.
pub struct MockProvider {
    calls: AtomicUsize,
    responder: Box<Responder>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RouteRequest, usize) -> Result<RouteCost, ProviderError> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            responder: Box::new(responder),
            gate: None,
            delay: None,
        }
    }

    /// Every pair costs `seconds`.
    pub fn constant(seconds: f64) -> Self {
        Self::new(move |_, _| Ok(RouteCost::new(seconds)))
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn route(&self, request: &RouteRequest) -> Result<RouteCost, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(request, call)
    }
}

/// Yield until `provider` has seen at least `calls` requests.
pub async fn wait_for_calls(provider: &MockProvider, calls: usize) {
    while provider.calls() < calls {
        tokio::task::yield_now().await;
    }
}
