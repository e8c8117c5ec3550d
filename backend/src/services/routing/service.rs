//! Batched, cached and cancellable route requests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};

use super::cache::RouteCache;
use super::provider::RoutingProvider;
use crate::api::TargetId;
use crate::config::RoutingSettings;
use crate::error::ProviderError;
use crate::models::{PopulationPoint, RouteKey, RouteRequest, RouteResult, RoutingMode, Target};
use crate::services::batch_tracker::{BatchTracker, LogLevel};

/// Per-call routing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteOptions {
    pub mode: RoutingMode,
}

impl RouteOptions {
    pub fn new(mode: RoutingMode) -> Self {
        Self { mode }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingRoute {
    key: RouteKey,
    request: RouteRequest,
}

struct Inner {
    provider: Arc<dyn RoutingProvider>,
    settings: RoutingSettings,
    cache: RouteCache,
    tracker: BatchTracker,
}

/// Front door to the routing provider.
///
/// Cheap to clone; clones share the cache, generation counter and tracker.
#[derive(Clone)]
pub struct RouteService {
    inner: Arc<Inner>,
}

impl RouteService {
    pub fn new(provider: Arc<dyn RoutingProvider>, settings: RoutingSettings) -> Self {
        Self::with_tracker(provider, settings, BatchTracker::new())
    }

    pub fn with_tracker(
        provider: Arc<dyn RoutingProvider>,
        settings: RoutingSettings,
        tracker: BatchTracker,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                settings,
                cache: RouteCache::new(),
                tracker,
            }),
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.cache.generation()
    }

    /// Abandon in-flight work. Cached results stay valid.
    pub fn supersede(&self) -> u64 {
        let generation = self.inner.cache.supersede();
        self.inner.tracker.supersede_before(generation);
        log::debug!("Route generation superseded, now {}", generation);
        generation
    }

    /// Abandon in-flight work and forget every cached result.
    pub fn invalidate(&self) -> u64 {
        let generation = self.inner.cache.invalidate();
        self.inner.tracker.supersede_before(generation);
        log::info!("Route cache invalidated, generation {}", generation);
        generation
    }

    /// Forget cached results for one target, e.g. when its id is reused.
    pub fn evict_target(&self, target: TargetId) -> usize {
        let evicted = self.inner.cache.evict_target(target);
        if evicted > 0 {
            log::debug!("Evicted {} cached routes to target {}", evicted, target);
        }
        evicted
    }

    pub fn cached(&self, key: &RouteKey) -> Option<RouteResult> {
        self.inner.cache.get(key)
    }

    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn tracker(&self) -> &BatchTracker {
        &self.inner.tracker
    }

    pub fn settings(&self) -> &RoutingSettings {
        &self.inner.settings
    }

    pub fn provider_name(&self) -> &str {
        self.inner.provider.name()
    }

    /// Request travel costs for every (point, target) pair.
    ///
    /// Pairs are deduplicated. Cached pairs are yielded first, then the rest
    /// in batches of `batch_size` with at most `concurrency` requests in
    /// flight. Every result carries the generation that was current when this
    /// method was called; once that generation is superseded no further
    /// requests are issued and late arrivals are dropped.
    pub fn request_routes(
        &self,
        points: &[PopulationPoint],
        targets: &[Target],
        options: RouteOptions,
    ) -> BoxStream<'static, RouteResult> {
        let generation = self.generation();
        let mode = options.mode;

        let mut seen = HashSet::with_capacity(points.len() * targets.len());
        let mut hits = Vec::new();
        let mut misses = Vec::new();
        for point in points {
            for target in targets {
                let key = RouteKey::new(point.id, target.id, mode);
                if !seen.insert(key) {
                    continue;
                }
                match self.inner.cache.get(&key) {
                    Some(hit) => hits.push(hit.restamped(generation)),
                    None => misses.push(PendingRoute {
                        key,
                        request: RouteRequest {
                            origin: point.location,
                            destination: target.location,
                            mode,
                        },
                    }),
                }
            }
        }

        let requested = hits.len() + misses.len();
        self.inner
            .tracker
            .start(generation, mode, requested, hits.len());
        log::info!(
            "Route generation {}: {} pairs ({} cached, {} to {})",
            generation,
            requested,
            hits.len(),
            misses.len(),
            self.inner.provider.name()
        );

        let inner = Arc::clone(&self.inner);
        let batch_size = inner.settings.batch_size.max(1);
        let concurrency = inner.settings.concurrency.max(1);

        let stream = async_stream::stream! {
            for hit in hits {
                yield hit;
            }

            let mut superseded = false;
            for batch in misses.chunks(batch_size) {
                if !inner.cache.is_current(generation) {
                    superseded = true;
                    break;
                }
                let mut arrivals = stream::iter(batch.iter().copied())
                    .map(|pending| resolve(&inner, pending, generation))
                    .buffer_unordered(concurrency);

                while let Some(result) = arrivals.next().await {
                    if !inner.cache.is_current(generation) {
                        log::debug!(
                            "Dropping stale result for point {} / target {} (generation {})",
                            result.population_point_id,
                            result.target_id,
                            generation
                        );
                        inner.tracker.record_stale(generation);
                        superseded = true;
                        continue;
                    }
                    inner.cache.insert(&result);
                    inner.tracker.record(&result);
                    yield result;
                }
            }

            if superseded || !inner.cache.is_current(generation) {
                inner.tracker.log(generation, LogLevel::Warning, "Superseded before completion");
                inner.tracker.finish(generation, true);
            } else {
                inner.tracker.finish(generation, false);
            }
        };
        stream.boxed()
    }
}

/// Route one pair, retrying transient failures while the generation is current.
async fn resolve(inner: &Inner, pending: PendingRoute, generation: u64) -> RouteResult {
    let key = pending.key;
    if !inner.cache.is_current(generation) {
        // Never issued; the caller drops it as stale.
        return RouteResult::pending(key, generation);
    }

    inner.tracker.record_issued(generation);
    let timeout_ms = inner.settings.timeout_ms;
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            inner.provider.route(&pending.request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout { millis: timeout_ms }),
        };

        match outcome {
            Ok(cost) if cost.is_valid() => {
                return RouteResult::reachable(key, cost.cost_seconds, generation);
            }
            Ok(cost) => {
                log::warn!(
                    "Provider returned unusable cost {} for point {} / target {}",
                    cost.cost_seconds,
                    key.point,
                    key.target
                );
                return RouteResult::failed(key, generation);
            }
            Err(ProviderError::NoRoute) => return RouteResult::unreachable(key, generation),
            Err(e)
                if e.is_retryable()
                    && attempt < inner.settings.max_retries
                    && inner.cache.is_current(generation) =>
            {
                attempt += 1;
                inner.tracker.record_retry(generation);
                log::debug!(
                    "Retrying point {} / target {} after {} (attempt {})",
                    key.point,
                    key.target,
                    e,
                    attempt
                );
                tokio::time::sleep(Duration::from_millis(inner.settings.retry_delay_ms)).await;
            }
            Err(e) => {
                log::debug!(
                    "Route failed for point {} / target {}: {}",
                    key.point,
                    key.target,
                    e
                );
                return RouteResult::failed(key, generation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PointId, TargetId};
    use crate::models::LatLng;
    use crate::services::routing::StraightLineProvider;

    fn service() -> RouteService {
        RouteService::new(
            Arc::new(StraightLineProvider::default()),
            RoutingSettings::default(),
        )
    }

    fn points() -> Vec<PopulationPoint> {
        vec![
            PopulationPoint::new(PointId(1), LatLng::new(0.0, 0.0), 1.0),
            PopulationPoint::new(PointId(2), LatLng::new(0.0, 0.01), 1.0),
        ]
    }

    fn targets() -> Vec<Target> {
        vec![Target::new(TargetId(10), LatLng::new(0.01, 0.0), "school")]
    }

    #[tokio::test]
    async fn test_request_routes_resolves_every_pair() {
        let service = service();
        let results: Vec<RouteResult> = service
            .request_routes(&points(), &targets(), RouteOptions::default())
            .collect()
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.cost.is_some()));
        assert_eq!(service.cache_len(), 2);

        let record = service.tracker().get(0).unwrap();
        assert_eq!(record.reachable, 2);
        assert_eq!(record.status, crate::services::batch_tracker::BatchStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_pairs_are_requested_once() {
        let service = service();
        let mut pts = points();
        pts.push(pts[0].clone());
        let results: Vec<RouteResult> = service
            .request_routes(&pts, &targets(), RouteOptions::default())
            .collect()
            .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_hits_restamped_with_current_generation() {
        let service = service();
        let _: Vec<RouteResult> = service
            .request_routes(&points(), &targets(), RouteOptions::default())
            .collect()
            .await;
        let generation = service.supersede();

        let results: Vec<RouteResult> = service
            .request_routes(&points(), &targets(), RouteOptions::default())
            .collect()
            .await;
        assert!(results.iter().all(|r| r.generation == generation));
        assert_eq!(service.tracker().get(generation).unwrap().cache_hits, 2);
    }

    #[tokio::test]
    async fn test_invalidate_forgets_cache() {
        let service = service();
        let _: Vec<RouteResult> = service
            .request_routes(&points(), &targets(), RouteOptions::default())
            .collect()
            .await;
        service.invalidate();
        assert_eq!(service.cache_len(), 0);
        assert_eq!(service.generation(), 1);
    }
}
