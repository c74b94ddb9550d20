//! Route scoring strategies implementing the Strategy pattern.
//!
//! The planner gathers per-route metrics and hands them to a
//! [`ScoringStrategy`], which decides the order (and optionally the subset) of
//! routes a set keeps. Swapping the heuristic never touches the planner.

use std::collections::HashMap;

/// Metric name to weight.
pub type Weights = HashMap<String, f64>;

/// Metric name to raw value for one route.
pub type RouteMetrics = HashMap<String, f64>;

/// Trait for route-set scoring strategies.
pub trait ScoringStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Order `candidates` best first, possibly dropping some.
    ///
    /// `metrics` may lack entries for some candidates. Ids the strategy returns
    /// that are not in `candidates` are discarded by the planner.
    fn rank(
        &self,
        candidates: &[String],
        metrics: &HashMap<String, RouteMetrics>,
        weights: &Weights,
    ) -> Vec<String>;
}

/// Weighted sum of min-max normalized metrics.
///
/// Each weighted metric is rescaled to `[0, 1]` across the candidates that
/// report it (a metric with no spread normalizes to 1). A candidate missing a
/// metric contributes 0 for it. Candidates with no metrics at all keep their
/// relative order after every scored candidate. Ties keep input order.
#[derive(Debug, Clone, Default)]
pub struct LinearScoring {
    keep: Option<usize>,
}

impl LinearScoring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the best `n` routes.
    pub fn keep(n: usize) -> Self {
        Self { keep: Some(n) }
    }

    /// Score of every candidate that has metrics.
    pub fn scores(
        candidates: &[String],
        metrics: &HashMap<String, RouteMetrics>,
        weights: &Weights,
    ) -> HashMap<String, f64> {
        let mut bounds: HashMap<&str, (f64, f64)> = HashMap::new();
        for id in candidates {
            let Some(values) = metrics.get(id) else {
                continue;
            };
            for (name, value) in values {
                if !value.is_finite() || !weights.contains_key(name) {
                    continue;
                }
                bounds
                    .entry(name.as_str())
                    .and_modify(|(lo, hi)| {
                        *lo = lo.min(*value);
                        *hi = hi.max(*value);
                    })
                    .or_insert((*value, *value));
            }
        }

        candidates
            .iter()
            .filter_map(|id| {
                let values = metrics.get(id)?;
                let score = weights
                    .iter()
                    .filter_map(|(name, weight)| {
                        let value = *values.get(name)?;
                        let (lo, hi) = *bounds.get(name.as_str())?;
                        let normalized = if hi > lo { (value - lo) / (hi - lo) } else { 1.0 };
                        Some(weight * normalized)
                    })
                    .sum::<f64>();
                Some((id.clone(), score))
            })
            .collect()
    }
}

impl ScoringStrategy for LinearScoring {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn rank(
        &self,
        candidates: &[String],
        metrics: &HashMap<String, RouteMetrics>,
        weights: &Weights,
    ) -> Vec<String> {
        let scores = Self::scores(candidates, metrics, weights);

        let mut scored: Vec<(&String, f64)> = candidates
            .iter()
            .filter_map(|id| scores.get(id).map(|s| (id, *s)))
            .collect();
        // stable: equal scores keep input order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut ranked: Vec<String> = scored.into_iter().map(|(id, _)| id.clone()).collect();
        ranked.extend(
            candidates
                .iter()
                .filter(|id| !scores.contains_key(*id))
                .cloned(),
        );

        if let Some(n) = self.keep {
            ranked.truncate(n);
        }
        ranked
    }
}
