//! Distribution engine: bucketing of (cost, weight) pairs and weighted statistics.
//!
//! ## Bucket assignment
//! - Every cost lands in exactly one bucket: `edges[i] <= cost < edges[i+1]`,
//!   with the last regular bucket closed on both ends.
//! - When a cutoff is configured (or explicit edges are given) an overflow
//!   bucket is always appended and receives every cost above the last edge.
//! - Without a cutoff the edges stretch to cover the observed maximum.
//! - Empty input yields zero-weight buckets, never an error.
//! - At most [`MAX_BUCKETS`] regular buckets. Configs that would need more
//!   are rejected; an open-ended width widens to a multiple of itself.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ErrorContext};
use crate::models::{CostStats, DistributionBucket};

/// Default bucket width in seconds (5 minutes).
pub const DEFAULT_BUCKET_WIDTH: f64 = 300.0;

/// Upper bound on regular buckets in one distribution.
pub const MAX_BUCKETS: usize = 10_000;

/// How bucket edges are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BucketSpec {
    /// Fixed-width buckets starting at zero.
    Width { width: f64 },
    /// A fixed number of equal buckets over `[0, cutoff or max]`.
    Count { count: usize },
    /// Explicit edges; must start at 0 and be strictly increasing.
    Edges { edges: Vec<f64> },
    /// Sturges' rule over the observed range.
    Auto,
}

impl Default for BucketSpec {
    fn default() -> Self {
        Self::Width {
            width: DEFAULT_BUCKET_WIDTH,
        }
    }
}

/// Bucketing configuration for one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    #[serde(default)]
    pub bucket: BucketSpec,
    /// Costs above this go to the overflow bucket. Not allowed with explicit edges.
    #[serde(default)]
    pub max_cutoff: Option<f64>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            bucket: BucketSpec::default(),
            max_cutoff: None,
        }
    }
}

impl DistributionConfig {
    pub fn width(width: f64) -> Self {
        Self {
            bucket: BucketSpec::Width { width },
            max_cutoff: None,
        }
    }

    pub fn count(count: usize) -> Self {
        Self {
            bucket: BucketSpec::Count { count },
            max_cutoff: None,
        }
    }

    pub fn edges(edges: Vec<f64>) -> Self {
        Self {
            bucket: BucketSpec::Edges { edges },
            max_cutoff: None,
        }
    }

    pub fn auto() -> Self {
        Self {
            bucket: BucketSpec::Auto,
            max_cutoff: None,
        }
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.max_cutoff = Some(cutoff);
        self
    }

    /// Check the configuration without touching any data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ctx = || ErrorContext::new("validate_distribution").with_entity("distribution_config");

        if let Some(cutoff) = self.max_cutoff {
            if !cutoff.is_finite() || cutoff <= 0.0 {
                return Err(ConfigError::with_context(
                    format!("max_cutoff must be a positive finite number (got {})", cutoff),
                    ctx(),
                ));
            }
        }

        match &self.bucket {
            BucketSpec::Width { width } => {
                if !width.is_finite() || *width <= 0.0 {
                    return Err(ConfigError::with_context(
                        format!("bucket width must be a positive finite number (got {})", width),
                        ctx(),
                    ));
                }
                if let Some(cutoff) = self.max_cutoff {
                    let needed = (cutoff / width).ceil();
                    if !needed.is_finite() || needed > MAX_BUCKETS as f64 {
                        return Err(ConfigError::with_context(
                            format!(
                                "width {} up to cutoff {} needs more than {} buckets",
                                width, cutoff, MAX_BUCKETS
                            ),
                            ctx(),
                        ));
                    }
                }
            }
            BucketSpec::Count { count } => {
                if *count == 0 {
                    return Err(ConfigError::with_context(
                        "bucket count must be at least 1",
                        ctx(),
                    ));
                }
                if *count > MAX_BUCKETS {
                    return Err(ConfigError::with_context(
                        format!("bucket count must be at most {} (got {})", MAX_BUCKETS, count),
                        ctx(),
                    ));
                }
            }
            BucketSpec::Edges { edges } => {
                if self.max_cutoff.is_some() {
                    return Err(ConfigError::with_context(
                        "max_cutoff cannot be combined with explicit edges; the last edge is the cutoff",
                        ctx(),
                    ));
                }
                if edges.len() < 2 {
                    return Err(ConfigError::with_context(
                        format!("at least two edges are required (got {})", edges.len()),
                        ctx(),
                    ));
                }
                if edges.len() - 1 > MAX_BUCKETS {
                    return Err(ConfigError::with_context(
                        format!("at most {} buckets (got {} edges)", MAX_BUCKETS, edges.len()),
                        ctx(),
                    ));
                }
                if edges[0] != 0.0 {
                    return Err(ConfigError::with_context(
                        format!("the first edge must be 0 (got {})", edges[0]),
                        ctx(),
                    ));
                }
                if edges.iter().any(|e| !e.is_finite()) {
                    return Err(ConfigError::with_context("edges must be finite", ctx()));
                }
                if edges.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(ConfigError::with_context(
                        "edges must be strictly increasing",
                        ctx(),
                    ));
                }
            }
            BucketSpec::Auto => {}
        }
        Ok(())
    }

    /// The cost above which values overflow, if any.
    pub fn cutoff(&self) -> Option<f64> {
        match &self.bucket {
            BucketSpec::Edges { edges } => edges.last().copied(),
            _ => self.max_cutoff,
        }
    }
}

/// Resolve the regular bucket edges for a set of costs.
///
/// Assumes a validated config.
fn resolve_edges(costs: &[(f64, f64)], config: &DistributionConfig) -> Vec<f64> {
    let observed_max = costs
        .iter()
        .map(|(c, _)| *c)
        .filter(|c| c.is_finite())
        .fold(0.0_f64, f64::max);
    // A zero range would produce zero-width buckets.
    let upper = match config.max_cutoff {
        Some(cutoff) => cutoff,
        None if observed_max > 0.0 => observed_max,
        None => 1.0,
    };

    match &config.bucket {
        BucketSpec::Edges { edges } => edges.clone(),
        BucketSpec::Width { width } => {
            let mut edges = vec![0.0];
            match config.max_cutoff {
                Some(cutoff) => {
                    let mut i = 1.0;
                    while i * width < cutoff {
                        edges.push(i * width);
                        i += 1.0;
                    }
                    edges.push(cutoff);
                }
                None => {
                    let raw = (observed_max / width).ceil().max(1.0);
                    let width = if raw > MAX_BUCKETS as f64 {
                        let widened = width * (raw / MAX_BUCKETS as f64).ceil();
                        if !widened.is_finite() {
                            return equal_edges(observed_max, MAX_BUCKETS);
                        }
                        log::warn!(
                            "Bucket width {} would need {} buckets up to {}; using {}",
                            width,
                            raw,
                            observed_max,
                            widened
                        );
                        widened
                    } else {
                        *width
                    };
                    let n = (observed_max / width).ceil().max(1.0) as usize;
                    edges.extend((1..=n).map(|i| i as f64 * width));
                    // Guard against ceil(max / w) * w landing just below max.
                    if edges.last().is_some_and(|last| *last < observed_max) {
                        edges.push((n + 1) as f64 * width);
                    }
                }
            }
            edges
        }
        BucketSpec::Count { count } => equal_edges(upper, *count),
        BucketSpec::Auto => {
            let k = if costs.is_empty() {
                1
            } else {
                ((costs.len() as f64).log2() + 1.0).ceil().max(1.0) as usize
            };
            equal_edges(upper, k)
        }
    }
}

fn equal_edges(upper: f64, count: usize) -> Vec<f64> {
    let width = upper / count as f64;
    let mut edges: Vec<f64> = (0..count).map(|i| i as f64 * width).collect();
    edges.push(upper);
    edges
}

/// Assign each (cost, weight) pair to a bucket.
///
/// Negative or non-finite costs are skipped with a warning; the route service
/// never produces them.
pub fn bucketize(
    costs: &[(f64, f64)],
    config: &DistributionConfig,
) -> Result<Vec<DistributionBucket>, ConfigError> {
    config.validate()?;

    let edges = resolve_edges(costs, config);
    let last_edge = edges[edges.len() - 1];
    let mut buckets: Vec<DistributionBucket> = edges
        .windows(2)
        .map(|w| DistributionBucket::range(w[0], w[1]))
        .collect();
    let mut overflow = config
        .cutoff()
        .map(|_| DistributionBucket::overflow(last_edge));

    for &(cost, weight) in costs {
        if !cost.is_finite() || cost < 0.0 {
            log::warn!("Skipping invalid cost {} in bucketize", cost);
            continue;
        }
        // Number of edges <= cost; bucket index is one less.
        let idx = edges.partition_point(|e| *e <= cost);
        if idx < edges.len() {
            buckets[idx - 1].add(weight);
        } else if cost == last_edge {
            buckets[edges.len() - 2].add(weight);
        } else if let Some(ref mut overflow) = overflow {
            overflow.add(weight);
        } else {
            // Edges always cover the observed max without a cutoff.
            buckets[edges.len() - 2].add(weight);
        }
    }

    buckets.extend(overflow);
    Ok(buckets)
}

/// Weighted `q`-quantile (0..=1) of `values` (cost, weight).
///
/// Returns the smallest cost whose cumulative weight reaches `q` of the total.
/// Falls back to an unweighted quantile when every weight is zero.
pub fn weighted_percentile(values: &[(f64, f64)], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let q = q.clamp(0.0, 1.0);
    let total: f64 = sorted.iter().map(|(_, w)| *w).sum();
    if total <= 0.0 {
        let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
        return sorted[idx].0;
    }

    let threshold = q * total;
    let mut cumulative = 0.0;
    for &(cost, weight) in &sorted {
        cumulative += weight;
        if cumulative >= threshold && weight > 0.0 {
            return cost;
        }
    }
    sorted[sorted.len() - 1].0
}

/// Compute weighted statistics for a set of (cost, weight) values.
pub fn compute_stats(values: &[(f64, f64)]) -> CostStats {
    if values.is_empty() {
        return CostStats::default();
    }

    let count = values.len();
    let total_weight: f64 = values.iter().map(|(_, w)| *w).sum();

    // Zero total weight degrades to plain (unweighted) moments.
    let weight_of = |w: f64| if total_weight > 0.0 { w } else { 1.0 };
    let denom = if total_weight > 0.0 {
        total_weight
    } else {
        count as f64
    };

    let mean = values.iter().map(|(c, w)| c * weight_of(*w)).sum::<f64>() / denom;
    let variance = values
        .iter()
        .map(|(c, w)| {
            let diff = c - mean;
            diff * diff * weight_of(*w)
        })
        .sum::<f64>()
        / denom;

    let min = values.iter().map(|(c, _)| *c).fold(f64::INFINITY, f64::min);
    let max = values.iter().map(|(c, _)| *c).fold(f64::NEG_INFINITY, f64::max);

    CostStats {
        count,
        total_weight,
        mean,
        median: weighted_percentile(values, 0.5),
        p90: weighted_percentile(values, 0.9),
        std_dev: variance.sqrt(),
        min,
        max,
    }
}
