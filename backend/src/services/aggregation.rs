//! Aggregation: joins population, selected targets and route results into an
//! [`AggregationResult`], and the stateful service that keeps that result
//! current while parameters change and routes arrive.
//!
//! ## Effective cost
//! A point's effective cost is the minimum Reachable cost among the selected
//! targets; ties go to the lowest [`TargetId`]. Points without any Reachable
//! result count as unreachable and stay out of the buckets; a Reachable result
//! with a negative or non-finite cost counts as no result. Missing or
//! Pending pairs never block: they mark the result incomplete.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api::{PointId, TargetId};
use crate::config::AggregationSettings;
use crate::error::{AccessError, ConfigError, ErrorContext};
use crate::models::{
    AggregationResult, PointCost, PopulationPoint, RouteKey, RouteResult, RouteStatus, RoutingMode,
    Target, TargetChange,
};
use crate::services::distribution::{bucketize, compute_stats, DistributionConfig};
use crate::services::population::{PopulationLoad, PopulationService};
use crate::services::routing::{RouteOptions, RouteService};
use crate::services::targets::TargetService;

/// Everything one aggregation pass reads.
#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    pub points: &'a [PopulationPoint],
    pub selection: &'a BTreeSet<TargetId>,
    /// Route results; when a pair appears twice the later entry wins.
    pub results: &'a [RouteResult],
    pub mode: RoutingMode,
    /// Results from any other generation are stale and ignored.
    pub generation: u64,
}

struct Accumulator<'a> {
    selection: &'a BTreeSet<TargetId>,
    mode: RoutingMode,
    generation: u64,
    lookup: HashMap<(PointId, TargetId), &'a RouteResult>,
    costs: Vec<(f64, f64)>,
    point_costs: Vec<PointCost>,
    total_weight: f64,
    unreachable_weight: f64,
    unreachable_count: usize,
    pending_pairs: usize,
}

impl<'a> Accumulator<'a> {
    fn new(input: &AggregationInput<'a>) -> Self {
        let known: HashSet<PointId> = input.points.iter().map(|p| p.id).collect();
        let mut lookup = HashMap::with_capacity(input.results.len());
        let mut ignored = 0usize;
        for result in input.results {
            let relevant = result.generation == input.generation
                && result.mode == input.mode
                && input.selection.contains(&result.target_id)
                && known.contains(&result.population_point_id);
            if relevant {
                lookup.insert((result.population_point_id, result.target_id), result);
            } else {
                ignored += 1;
            }
        }
        if ignored > 0 {
            log::debug!("Ignored {} route results outside the current query", ignored);
        }

        Self {
            selection: input.selection,
            mode: input.mode,
            generation: input.generation,
            lookup,
            costs: Vec::with_capacity(input.points.len()),
            point_costs: Vec::with_capacity(input.points.len()),
            total_weight: 0.0,
            unreachable_weight: 0.0,
            unreachable_count: 0,
            pending_pairs: 0,
        }
    }

    fn add(&mut self, point: &PopulationPoint) {
        let mut best: Option<(f64, TargetId)> = None;
        for &target in self.selection {
            match self.lookup.get(&(point.id, target)) {
                None => self.pending_pairs += 1,
                Some(result) if result.status == RouteStatus::Pending => self.pending_pairs += 1,
                Some(result) => {
                    // Targets iterate in ascending id order, so only a strictly
                    // lower cost replaces the current best.
                    let cost = result
                        .reachable_cost()
                        .filter(|c| c.is_finite() && *c >= 0.0);
                    match (cost, best) {
                        (Some(cost), Some((current, _))) if cost < current => {
                            best = Some((cost, target))
                        }
                        (Some(cost), None) => best = Some((cost, target)),
                        _ => {}
                    }
                }
            }
        }

        self.total_weight += point.weight;
        match best {
            Some((cost, _)) => self.costs.push((cost, point.weight)),
            None => {
                self.unreachable_weight += point.weight;
                self.unreachable_count += 1;
            }
        }
        self.point_costs.push(PointCost {
            point_id: point.id,
            location: point.location,
            weight: point.weight,
            cost: best.map(|(cost, _)| cost),
            nearest_target: best.map(|(_, target)| target),
        });
    }

    fn finish(self, config: &DistributionConfig) -> Result<AggregationResult, ConfigError> {
        let buckets = bucketize(&self.costs, config)?;
        let stats = compute_stats(&self.costs);
        Ok(AggregationResult {
            target_selection: self.selection.clone(),
            mode: self.mode,
            buckets,
            unreachable_weight: self.unreachable_weight,
            unreachable_count: self.unreachable_count,
            total_weight: self.total_weight,
            stats,
            point_costs: self.point_costs,
            complete: self.pending_pairs == 0,
            pending_pairs: self.pending_pairs,
            generation: self.generation,
        })
    }
}

/// Build the distribution for one selection. Pure and deterministic.
///
/// # Errors
/// Returns `ConfigError` when the distribution config is invalid, whatever
/// the data.
pub fn aggregate(
    input: &AggregationInput<'_>,
    config: &DistributionConfig,
) -> Result<AggregationResult, ConfigError> {
    config.validate()?;
    let mut acc = Accumulator::new(input);
    for point in input.points {
        acc.add(point);
    }
    acc.finish(config)
}

/// [`aggregate`], yielding to the scheduler every `chunk_size` points.
pub async fn aggregate_chunked(
    input: &AggregationInput<'_>,
    config: &DistributionConfig,
    chunk_size: usize,
) -> Result<AggregationResult, ConfigError> {
    config.validate()?;
    let mut acc = Accumulator::new(input);
    for chunk in input.points.chunks(chunk_size.max(1)) {
        for point in chunk {
            acc.add(point);
        }
        tokio::task::yield_now().await;
    }
    acc.finish(config)
}

/// What happened to a route result handed to [`AggregationService::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stored in the route table of the current generation.
    Applied,
    /// Produced under an older generation; dropped.
    Stale,
    /// Current generation but not part of the query (mode or target).
    Ignored,
}

struct Session {
    selection: BTreeSet<TargetId>,
    mode: RoutingMode,
    config: DistributionConfig,
    generation: u64,
    /// Bumped on every parameter or config change.
    revision: u64,
    table: HashMap<(PointId, TargetId), RouteResult>,
}

impl Session {
    fn results(&self) -> Vec<RouteResult> {
        self.table.values().cloned().collect()
    }
}

/// Stateful orchestrator over population, targets and routes.
pub struct AggregationService {
    population: PopulationService,
    targets: TargetService,
    routes: RouteService,
    settings: AggregationSettings,
    session: RwLock<Session>,
    publisher: watch::Sender<Arc<AggregationResult>>,
}

impl AggregationService {
    /// Create the service. The initial mode comes from the route settings.
    pub fn new(
        population: PopulationService,
        targets: TargetService,
        routes: RouteService,
        config: DistributionConfig,
        settings: AggregationSettings,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mode = routes.settings().mode;
        let session = Session {
            selection: BTreeSet::new(),
            mode,
            config,
            generation: routes.generation(),
            revision: 0,
            table: HashMap::new(),
        };
        let (publisher, _) = watch::channel(Arc::new(AggregationResult::empty(mode)));
        Ok(Self {
            population,
            targets,
            routes,
            settings,
            session: RwLock::new(session),
            publisher,
        })
    }

    pub fn population(&self) -> &PopulationService {
        &self.population
    }

    pub fn targets(&self) -> &TargetService {
        &self.targets
    }

    pub fn routes(&self) -> &RouteService {
        &self.routes
    }

    pub fn selection(&self) -> BTreeSet<TargetId> {
        self.session.read().selection.clone()
    }

    pub fn mode(&self) -> RoutingMode {
        self.session.read().mode
    }

    pub fn distribution_config(&self) -> DistributionConfig {
        self.session.read().config.clone()
    }

    pub fn generation(&self) -> u64 {
        self.session.read().generation
    }

    /// Latest published result.
    pub fn current(&self) -> Arc<AggregationResult> {
        Arc::clone(&self.publisher.borrow())
    }

    /// Receive every published result.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AggregationResult>> {
        self.publisher.subscribe()
    }

    /// Select targets by id. Unknown ids reject the whole selection.
    pub fn select_targets<I>(&self, ids: I) -> Result<Arc<AggregationResult>, AccessError>
    where
        I: IntoIterator<Item = TargetId>,
    {
        let selection: BTreeSet<TargetId> = ids.into_iter().collect();
        if let Some(missing) = selection.iter().find(|id| !self.targets.contains(**id)) {
            return Err(AccessError::not_found_with_context(
                format!("Target {} not found", missing),
                ErrorContext::new("select_targets")
                    .with_entity("target")
                    .with_entity_id(missing),
            ));
        }
        Ok(self.reset(|session| session.selection = selection)?)
    }

    /// Select every target of a category (case-insensitive).
    pub fn select_category(&self, category: &str) -> Result<Arc<AggregationResult>, ConfigError> {
        let selection: BTreeSet<TargetId> = self
            .targets
            .targets_in_category(category)
            .iter()
            .map(|t| t.id)
            .collect();
        log::info!("Category '{}' selects {} targets", category, selection.len());
        self.reset(|session| session.selection = selection)
    }

    pub fn set_mode(&self, mode: RoutingMode) -> Result<Arc<AggregationResult>, ConfigError> {
        self.reset(|session| session.mode = mode)
    }

    /// Replace the distribution config. On error nothing changes.
    pub fn set_distribution_config(
        &self,
        config: DistributionConfig,
    ) -> Result<Arc<AggregationResult>, ConfigError> {
        config.validate()?;
        {
            let mut session = self.session.write();
            session.config = config;
            session.revision += 1;
        }
        self.recompute()
    }

    /// Load a population document, dropping every cached route.
    pub fn load_population_json(&self, json: &str) -> Result<PopulationLoad, AccessError> {
        let load = self.population.load_json(json)?;
        self.after_population_change()?;
        Ok(load)
    }

    /// Replace the population, dropping every cached route.
    pub fn replace_population(&self, points: Vec<PopulationPoint>) -> Result<(), ConfigError> {
        self.population.replace(points);
        self.after_population_change()?;
        Ok(())
    }

    fn after_population_change(&self) -> Result<Arc<AggregationResult>, ConfigError> {
        // Point ids may now name other locations.
        let generation = self.routes.invalidate();
        {
            let mut session = self.session.write();
            session.generation = generation;
            session.revision += 1;
            session.table.clear();
        }
        self.recompute()
    }

    /// Apply a parameter change: supersede routing, reseed from cache, recompute.
    fn reset<F>(&self, change: F) -> Result<Arc<AggregationResult>, ConfigError>
    where
        F: FnOnce(&mut Session),
    {
        let generation = self.routes.supersede();
        let points = self.population.points();
        {
            let mut session = self.session.write();
            change(&mut session);
            session.generation = generation;
            session.revision += 1;
            session.table.clear();

            let mode = session.mode;
            let selection: Vec<TargetId> = session.selection.iter().copied().collect();
            for point in points.iter() {
                for &target in &selection {
                    if let Some(hit) = self.routes.cached(&RouteKey::new(point.id, target, mode)) {
                        session
                            .table
                            .insert((point.id, target), hit.restamped(generation));
                    }
                }
            }
        }
        self.recompute()
    }

    /// Offer a route result to the current route table.
    pub fn ingest(&self, result: RouteResult) -> Disposition {
        let mut session = self.session.write();
        if result.generation != session.generation {
            return Disposition::Stale;
        }
        if result.mode != session.mode || !session.selection.contains(&result.target_id) {
            return Disposition::Ignored;
        }
        session
            .table
            .insert((result.population_point_id, result.target_id), result);
        Disposition::Applied
    }

    /// Recompute from the current route table and publish.
    pub fn recompute(&self) -> Result<Arc<AggregationResult>, ConfigError> {
        let points = self.population.points();
        let session = self.session.read();
        let results = session.results();
        let input = AggregationInput {
            points: &points,
            selection: &session.selection,
            results: &results,
            mode: session.mode,
            generation: session.generation,
        };
        let result = Arc::new(aggregate(&input, &session.config)?);
        log::debug!(
            "Recomputed generation {}: complete={}, pending={}",
            result.generation,
            result.complete,
            result.pending_pairs
        );
        self.publisher.send_replace(Arc::clone(&result));
        Ok(result)
    }

    /// Chunked recompute; publishes only if no parameter changed meanwhile.
    async fn recompute_chunked(&self) -> Result<Arc<AggregationResult>, ConfigError> {
        let points = self.population.points();
        let (selection, mode, generation, revision, config, results) = {
            let session = self.session.read();
            (
                session.selection.clone(),
                session.mode,
                session.generation,
                session.revision,
                session.config.clone(),
                session.results(),
            )
        };
        let input = AggregationInput {
            points: &points,
            selection: &selection,
            results: &results,
            mode,
            generation,
        };
        let result = Arc::new(aggregate_chunked(&input, &config, self.settings.chunk_size).await?);

        if self.session.read().revision != revision {
            log::debug!("Discarding aggregation of superseded generation {}", generation);
            return Ok(self.current());
        }
        self.publisher.send_replace(Arc::clone(&result));
        Ok(result)
    }

    /// Route population × selection under the current generation and publish.
    ///
    /// Partial results are published every `publish_every` arrivals. A
    /// parameter change during the refresh ends it early; the returned result
    /// is then whatever is current.
    pub async fn refresh(&self) -> Result<Arc<AggregationResult>, ConfigError> {
        let points = self.population.points();
        let route_generation = self.routes.generation();
        let (selection, mode) = {
            let mut session = self.session.write();
            if session.generation != route_generation {
                // Someone else moved the route service on; follow it.
                session.generation = route_generation;
                session.revision += 1;
                session.table.clear();
            }
            (session.selection.clone(), session.mode)
        };
        let targets: Vec<Target> = selection
            .iter()
            .filter_map(|id| self.targets.get_target(*id))
            .collect();

        log::info!(
            "Refreshing generation {}: {} points x {} targets ({})",
            route_generation,
            points.len(),
            targets.len(),
            mode
        );

        let mut stream = self
            .routes
            .request_routes(&points, &targets, RouteOptions::new(mode));
        let publish_every = self.settings.publish_every.max(1);
        let mut applied = 0usize;
        let mut stale = 0usize;
        while let Some(result) = stream.next().await {
            match self.ingest(result) {
                Disposition::Applied => {
                    applied += 1;
                    if applied % publish_every == 0 {
                        self.recompute()?;
                    }
                }
                Disposition::Stale => stale += 1,
                Disposition::Ignored => {}
            }
        }
        if stale > 0 {
            log::debug!("Refresh dropped {} stale results", stale);
        }

        self.recompute_chunked().await
    }

    /// React to a change in the target set.
    ///
    /// Returns the recomputed result when the change affected the selection.
    pub fn handle_target_change(
        &self,
        change: TargetChange,
    ) -> Result<Option<Arc<AggregationResult>>, ConfigError> {
        match change {
            TargetChange::Added(id) => self.forget_target(id, false),
            TargetChange::Removed(id) => {
                // Stays selected if it was re-added before this change arrived.
                let gone = !self.targets.contains(id);
                self.forget_target(id, gone)
            }
            TargetChange::Reloaded => {
                // Ids may now name other locations.
                self.routes.invalidate();
                let targets = self.targets.clone();
                self.reset(|session| session.selection.retain(|id| targets.contains(*id)))
                    .map(Some)
            }
        }
    }

    /// Drop cached routes to a target whose id was removed or reused.
    fn forget_target(
        &self,
        id: TargetId,
        deselect: bool,
    ) -> Result<Option<Arc<AggregationResult>>, ConfigError> {
        if !self.session.read().selection.contains(&id) {
            self.routes.evict_target(id);
            return Ok(None);
        }
        if deselect {
            log::info!("Selected target {} removed", id);
        }
        // Supersede before evicting so in-flight routes to it are not cached again.
        self.routes.supersede();
        self.routes.evict_target(id);
        self.reset(|session| {
            if deselect {
                session.selection.remove(&id);
            }
        })
        .map(Some)
    }

    /// Drive [`Self::handle_target_change`] from the target service's channel.
    pub fn spawn_target_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut changes = self.targets.subscribe();
        tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("Missed {} target changes, resynchronizing", missed);
                        TargetChange::Reloaded
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(e) = service.handle_target_change(change) {
                    log::warn!("Failed to apply target change: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingSettings;
    use crate::models::{BucketKind, LatLng};
    use crate::services::routing::StraightLineProvider;

    fn point(id: i64, weight: f64) -> PopulationPoint {
        PopulationPoint::new(PointId(id), LatLng::new(0.0, id as f64 * 0.001), weight)
    }

    fn key(point: i64, target: i64) -> RouteKey {
        RouteKey::new(PointId(point), TargetId(target), RoutingMode::Walking)
    }

    fn selection(ids: &[i64]) -> BTreeSet<TargetId> {
        ids.iter().map(|id| TargetId(*id)).collect()
    }

    fn input<'a>(
        points: &'a [PopulationPoint],
        selection: &'a BTreeSet<TargetId>,
        results: &'a [RouteResult],
    ) -> AggregationInput<'a> {
        AggregationInput {
            points,
            selection,
            results,
            mode: RoutingMode::Walking,
            generation: 0,
        }
    }

    #[test]
    fn test_width_example() {
        let points = vec![point(1, 10.0), point(2, 20.0), point(3, 30.0)];
        let sel = selection(&[1]);
        let results = vec![
            RouteResult::reachable(key(1, 1), 5.0, 0),
            RouteResult::reachable(key(2, 1), 15.0, 0),
            RouteResult::unreachable(key(3, 1), 0),
        ];
        let result = aggregate(&input(&points, &sel, &results), &DistributionConfig::width(10.0))
            .unwrap();

        assert_eq!(result.buckets.len(), 2);
        assert_eq!((result.buckets[0].range_start, result.buckets[0].range_end), (0.0, 10.0));
        assert_eq!(result.buckets[0].total_weight, 10.0);
        assert_eq!((result.buckets[1].range_start, result.buckets[1].range_end), (10.0, 20.0));
        assert_eq!(result.buckets[1].total_weight, 20.0);
        assert_eq!(result.unreachable_weight, 30.0);
        assert_eq!(result.unreachable_count, 1);
        assert_eq!(result.total_weight, 60.0);
        assert!(result.complete);
    }

    #[test]
    fn test_empty_population() {
        let sel = selection(&[1]);
        let result = aggregate(&input(&[], &sel, &[]), &DistributionConfig::width(10.0)).unwrap();
        assert_eq!(result.total_weight, 0.0);
        assert!(result.buckets.iter().all(|b| b.total_weight == 0.0));
        assert!(result.complete);
    }

    #[test]
    fn test_min_cost_and_tie_break() {
        let points = vec![point(1, 1.0), point(2, 1.0)];
        let sel = selection(&[3, 7, 9]);
        let results = vec![
            RouteResult::reachable(key(1, 9), 40.0, 0),
            RouteResult::reachable(key(1, 7), 25.0, 0),
            RouteResult::unreachable(key(1, 3), 0),
            RouteResult::reachable(key(2, 9), 30.0, 0),
            RouteResult::reachable(key(2, 3), 30.0, 0),
            RouteResult::failed(key(2, 7), 0),
        ];
        let result = aggregate(&input(&points, &sel, &results), &DistributionConfig::default())
            .unwrap();

        assert_eq!(result.point_costs[0].cost, Some(25.0));
        assert_eq!(result.point_costs[0].nearest_target, Some(TargetId(7)));
        assert_eq!(result.point_costs[1].nearest_target, Some(TargetId(3)));
        assert!(result.complete);
    }

    #[test]
    fn test_irrelevant_results_are_ignored() {
        let points = vec![point(1, 5.0)];
        let sel = selection(&[1]);
        let mut cycling = RouteResult::reachable(key(1, 1), 1.0, 0);
        cycling.mode = RoutingMode::Cycling;
        let results = vec![
            cycling,
            RouteResult::reachable(key(1, 2), 2.0, 0),
            RouteResult::reachable(key(99, 1), 3.0, 0),
            RouteResult::reachable(key(1, 1), 4.0, 5),
        ];
        let result = aggregate(&input(&points, &sel, &results), &DistributionConfig::default())
            .unwrap();

        assert_eq!(result.unreachable_weight, 5.0);
        assert!(!result.complete);
        assert_eq!(result.pending_pairs, 1);
    }

    #[test]
    fn test_pending_marks_incomplete_but_later_result_wins() {
        let points = vec![point(1, 1.0), point(2, 1.0)];
        let sel = selection(&[1]);
        let results = vec![
            RouteResult::pending(key(1, 1), 0),
            RouteResult::reachable(key(1, 1), 12.0, 0),
            RouteResult::pending(key(2, 1), 0),
        ];
        let result = aggregate(&input(&points, &sel, &results), &DistributionConfig::default())
            .unwrap();

        assert_eq!(result.point_costs[0].cost, Some(12.0));
        assert_eq!(result.pending_pairs, 1);
        assert!(!result.complete);
    }

    #[test]
    fn test_unusable_reachable_cost_counts_as_unreachable() {
        let points = vec![point(1, 10.0), point(2, 20.0), point(3, 5.0)];
        let sel = selection(&[1, 2]);
        let results = vec![
            RouteResult::reachable(key(1, 1), -5.0, 0),
            RouteResult::reachable(key(1, 2), f64::NAN, 0),
            RouteResult::reachable(key(2, 1), f64::INFINITY, 0),
            RouteResult::unreachable(key(2, 2), 0),
            RouteResult::reachable(key(3, 1), f64::NAN, 0),
            RouteResult::reachable(key(3, 2), 90.0, 0),
        ];
        let result = aggregate(&input(&points, &sel, &results), &DistributionConfig::default())
            .unwrap();

        assert_eq!(result.total_weight, 35.0);
        assert_eq!(result.unreachable_weight, 30.0);
        assert_eq!(result.unreachable_count, 2);
        assert_eq!(result.bucketed_weight(), 5.0);
        assert_eq!(result.point_costs[2].cost, Some(90.0));
        assert_eq!(result.point_costs[2].nearest_target, Some(TargetId(2)));
        assert!(result.complete);
    }

    #[test]
    fn test_invalid_config_errors_even_without_data() {
        let sel = selection(&[]);
        let err = aggregate(&input(&[], &sel, &[]), &DistributionConfig::width(0.0));
        assert!(err.is_err());
    }

    #[test]
    fn test_cutoff_overflow() {
        let points = vec![point(1, 2.0), point(2, 3.0)];
        let sel = selection(&[1]);
        let results = vec![
            RouteResult::reachable(key(1, 1), 100.0, 0),
            RouteResult::reachable(key(2, 1), 5000.0, 0),
        ];
        let config = DistributionConfig::width(300.0).with_cutoff(600.0);
        let result = aggregate(&input(&points, &sel, &results), &config).unwrap();

        let overflow = result.buckets.last().unwrap();
        assert_eq!(overflow.kind, BucketKind::Overflow);
        assert_eq!(overflow.total_weight, 3.0);
        assert_eq!(result.bucketed_weight(), 5.0);
    }

    #[tokio::test]
    async fn test_chunked_matches_pure() {
        let points: Vec<PopulationPoint> = (1..=50).map(|i| point(i, i as f64)).collect();
        let sel = selection(&[1, 2]);
        let results: Vec<RouteResult> = (1..=50)
            .flat_map(|i| {
                [
                    RouteResult::reachable(key(i, 1), i as f64 * 7.0, 0),
                    RouteResult::reachable(key(i, 2), 300.0 - i as f64, 0),
                ]
            })
            .collect();
        let config = DistributionConfig::count(6);
        let input = input(&points, &sel, &results);

        let pure = aggregate(&input, &config).unwrap();
        let chunked = aggregate_chunked(&input, &config, 7).await.unwrap();
        assert_eq!(pure, chunked);
    }

    fn service() -> AggregationService {
        let population = PopulationService::with_points(vec![point(1, 10.0), point(2, 20.0)]);
        let targets = TargetService::new();
        targets
            .add_target(Target::new(TargetId(1), LatLng::new(0.0, 0.0), "school"))
            .unwrap();
        targets
            .add_target(Target::new(TargetId(2), LatLng::new(0.01, 0.0), "hospital"))
            .unwrap();
        let routes = RouteService::new(
            Arc::new(StraightLineProvider::default()),
            RoutingSettings::default(),
        );
        AggregationService::new(
            population,
            targets,
            routes,
            DistributionConfig::default(),
            AggregationSettings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_publishes_complete_result() {
        let service = service();
        let mut rx = service.subscribe();
        service.select_targets([TargetId(1)]).unwrap();
        assert!(!service.current().complete);

        let result = service.refresh().await.unwrap();
        assert!(result.complete);
        assert_eq!(result.total_weight, 30.0);
        assert_eq!(result.unreachable_weight, 0.0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().generation, result.generation);
    }

    #[tokio::test]
    async fn test_reselect_reuses_cache_immediately() {
        let service = service();
        service.select_targets([TargetId(1)]).unwrap();
        service.refresh().await.unwrap();

        service.select_category("hospital").unwrap();
        let back = service.select_targets([TargetId(1)]).unwrap();
        // Served from the route cache without another refresh.
        assert!(back.complete);
        assert_eq!(back.generation, service.routes().generation());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let service = service();
        let err = service.select_targets([TargetId(42)]).unwrap_err();
        assert!(matches!(err, AccessError::NotFound { .. }));
        assert!(service.selection().is_empty());
    }

    #[test]
    fn test_invalid_distribution_config_keeps_previous() {
        let service = service();
        let before = service.current();
        assert!(service
            .set_distribution_config(DistributionConfig::count(0))
            .is_err());
        assert_eq!(service.distribution_config(), DistributionConfig::default());
        assert!(Arc::ptr_eq(&before, &service.current()));
    }

    #[test]
    fn test_stale_results_dropped() {
        let service = service();
        service.select_targets([TargetId(1)]).unwrap();
        let old = service.generation();
        service.set_mode(RoutingMode::Cycling).unwrap();

        assert_eq!(
            service.ingest(RouteResult::reachable(key(1, 1), 10.0, old)),
            Disposition::Stale
        );
        let mut current = RouteResult::reachable(key(1, 1), 10.0, service.generation());
        assert_eq!(service.ingest(current.clone()), Disposition::Ignored);
        current.mode = RoutingMode::Cycling;
        assert_eq!(service.ingest(current), Disposition::Applied);
    }

    #[tokio::test]
    async fn test_removed_target_leaves_selection() {
        let service = service();
        service.select_targets([TargetId(1), TargetId(2)]).unwrap();
        let before = service.generation();

        service.targets().remove_target(TargetId(2));
        let result = service
            .handle_target_change(TargetChange::Removed(TargetId(2)))
            .unwrap()
            .unwrap();
        assert_eq!(result.target_selection, selection(&[1]));
        assert!(service.generation() > before);
        assert!(service
            .handle_target_change(TargetChange::Added(TargetId(3)))
            .unwrap()
            .is_none());
    }
}
