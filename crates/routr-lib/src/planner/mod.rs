//! Route-set planning: creation, optimization, and analysis.
//!
//! # Overview
//!
//! A [`RoutePlanner`] owns the route-set registry and the per-route analytics
//! map behind a single reader/writer lock. Sets are created from a search
//! (served from the [`RouteCache`] when a fresh entry exists), reordered by a
//! pluggable [`ScoringStrategy`], and analyzed into immutable snapshots.
//!
//! The lock is never held across a store call. Every mutation of a set is
//! computed outside the lock and applied in one write, so readers never see a
//! partially updated set.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use routr_lib::{InMemoryRouteStore, RouteCache, RoutePlanner, RouteSearch, SearchCriteria};
//!
//! # async fn demo() -> routr_lib::Result<()> {
//! let store = Arc::new(InMemoryRouteStore::new());
//! let planner = RoutePlanner::new(
//!     RouteSearch::new(store),
//!     Arc::new(RouteCache::new(Duration::from_secs(900))),
//! );
//! let criteria = SearchCriteria::default().near(-1.2865, 36.815);
//! let set = planner.create_route_set("cbd", &criteria).await?;
//! let analysis = planner.analyze_route_set(&set.id).await?;
//! println!("{} routes, {:.1} km2", analysis.route_count, analysis.coverage_area);
//! # Ok(())
//! # }
//! ```

pub mod strategy;

pub use strategy::{LinearScoring, RouteMetrics, ScoringStrategy, Weights};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::RouteCache;
use crate::error::{Error, Result};
use crate::model::{Route, RouteAnalytics, RouteSet, RouteSetAnalysis, SearchCriteria};
use crate::search::RouteSearch;
use crate::spatial::{cell_for_location, interpolated_path, CellId, CELL_AREA_KM2, SEARCH_RESOLUTION};

/// Metric derived from `RouteAnalytics::reliability`.
pub const METRIC_RELIABILITY: &str = "reliability";
/// Metric derived from `RouteAnalytics::usage_count`.
pub const METRIC_USAGE: &str = "usage";
/// Metric derived from `RouteAnalytics::average_delay` (negated, so higher is better).
pub const METRIC_PUNCTUALITY: &str = "punctuality";

#[derive(Debug, Clone)]
struct SetEntry {
    set: RouteSet,
    member_cells: HashMap<String, HashSet<CellId>>,
}

#[derive(Debug, Default)]
struct Registry {
    sets: HashMap<String, SetEntry>,
    analytics: HashMap<String, RouteAnalytics>,
}

/// Owner of route sets and per-route analytics.
pub struct RoutePlanner {
    registry: RwLock<Registry>,
    cache: Arc<RouteCache>,
    search: RouteSearch,
    strategy: Box<dyn ScoringStrategy>,
}

impl RoutePlanner {
    /// Planner using [`LinearScoring`].
    pub fn new(search: RouteSearch, cache: Arc<RouteCache>) -> Self {
        Self::with_strategy(search, cache, Box::new(LinearScoring::new()))
    }

    pub fn with_strategy(
        search: RouteSearch,
        cache: Arc<RouteCache>,
        strategy: Box<dyn ScoringStrategy>,
    ) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            cache,
            search,
            strategy,
        }
    }

    pub fn cache(&self) -> &Arc<RouteCache> {
        &self.cache
    }

    pub fn search(&self) -> &RouteSearch {
        &self.search
    }

    /// Search for routes matching `criteria` and register them as a new set.
    pub async fn create_route_set(&self, name: &str, criteria: &SearchCriteria) -> Result<RouteSet> {
        criteria.validate()?;

        let key = criteria.cache_key();
        let routes = match self.cache.get_fresh(&key).await {
            Some(routes) => {
                debug!(key = %key, "route set search served from cache");
                routes
            }
            None => {
                let routes = self.search.search_routes(criteria).await?;
                self.cache.set(key.clone(), routes.clone()).await;
                Arc::new(routes)
            }
        };

        let mut members = Vec::new();
        let mut member_cells = HashMap::new();
        for route in routes.iter() {
            if route.id.is_empty() || member_cells.contains_key(&route.id) {
                continue;
            }
            member_cells.insert(route.id.clone(), route_cells(route)?);
            members.push(route.id.clone());
        }

        let now = Utc::now();
        let mut properties = HashMap::new();
        if let Ok(value) = serde_json::to_value(criteria) {
            properties.insert("criteria".to_string(), value);
        }
        let set = RouteSet {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            coverage: coverage_of(&members, &member_cells),
            routes: members,
            properties,
            created_at: now,
            updated_at: now,
        };

        self.registry.write().await.sets.insert(
            set.id.clone(),
            SetEntry {
                set: set.clone(),
                member_cells,
            },
        );

        metrics::counter!("routr_route_sets_created_total").increment(1);
        info!(set_id = %set.id, name, routes = set.routes.len(), cells = set.coverage.len(), "route set created");
        Ok(set)
    }

    /// Reorder a set using analytics-derived metrics.
    pub async fn optimize_route_set(&self, set_id: &str, weights: &Weights) -> Result<RouteSet> {
        self.optimize_route_set_with_signals(set_id, weights, &HashMap::new())
            .await
    }

    /// Reorder a set using analytics-derived metrics overlaid with `signals`.
    ///
    /// A signal value replaces the analytics-derived value of the same name.
    pub async fn optimize_route_set_with_signals(
        &self,
        set_id: &str,
        weights: &Weights,
        signals: &HashMap<String, RouteMetrics>,
    ) -> Result<RouteSet> {
        validate_weights(weights)?;

        let (members, mut route_metrics) = {
            let registry = self.registry.read().await;
            let entry = registry
                .sets
                .get(set_id)
                .ok_or_else(|| Error::route_set_not_found(set_id))?;
            let derived: HashMap<String, RouteMetrics> = entry
                .set
                .routes
                .iter()
                .filter_map(|id| registry.analytics.get(id).map(|a| (id.clone(), base_metrics(a))))
                .collect();
            (entry.set.routes.clone(), derived)
        };

        for id in &members {
            if let Some(overlay) = signals.get(id) {
                route_metrics
                    .entry(id.clone())
                    .or_default()
                    .extend(overlay.iter().map(|(k, v)| (k.clone(), *v)));
            }
        }

        let allowed: HashSet<&String> = members.iter().collect();
        let mut seen = HashSet::new();
        let ranked: Vec<String> = self
            .strategy
            .rank(&members, &route_metrics, weights)
            .into_iter()
            .filter(|id| allowed.contains(id) && seen.insert(id.clone()))
            .collect();

        let mut registry = self.registry.write().await;
        let entry = registry
            .sets
            .get_mut(set_id)
            .ok_or_else(|| Error::route_set_not_found(set_id))?;
        entry.member_cells.retain(|id, _| seen.contains(id));
        entry.set.coverage = coverage_of(&ranked, &entry.member_cells);
        entry.set.routes = ranked;
        entry.set.updated_at = Utc::now();
        entry.set.properties.insert(
            "strategy".to_string(),
            Value::String(self.strategy.name().to_string()),
        );

        metrics::counter!("routr_route_sets_optimized_total").increment(1);
        info!(
            set_id,
            strategy = self.strategy.name(),
            scored = route_metrics.len(),
            routes = entry.set.routes.len(),
            "route set optimized"
        );
        Ok(entry.set.clone())
    }

    /// Snapshot of a set's coverage and member analytics.
    pub async fn analyze_route_set(&self, set_id: &str) -> Result<RouteSetAnalysis> {
        let registry = self.registry.read().await;
        let entry = registry
            .sets
            .get(set_id)
            .ok_or_else(|| Error::route_set_not_found(set_id))?;
        let set = &entry.set;

        let known: Vec<&RouteAnalytics> = set
            .routes
            .iter()
            .filter_map(|id| registry.analytics.get(id))
            .collect();

        let mut average_metrics = BTreeMap::new();
        let mut reliability_score = 0.0;
        if !known.is_empty() {
            let n = known.len() as f64;
            reliability_score = known.iter().map(|a| a.reliability).sum::<f64>() / n;
            average_metrics.insert(
                "usage_count".to_string(),
                known.iter().map(|a| a.usage_count as f64).sum::<f64>() / n,
            );
            average_metrics.insert(
                "average_delay".to_string(),
                known.iter().map(|a| a.average_delay).sum::<f64>() / n,
            );
            average_metrics.insert("reliability".to_string(), reliability_score);
        }

        let mut hour_counts: BTreeMap<u32, usize> = BTreeMap::new();
        for analytics in &known {
            let hours: BTreeSet<u32> = analytics.peak_hours.iter().copied().collect();
            for hour in hours {
                *hour_counts.entry(hour).or_default() += 1;
            }
        }
        // an hour is a set-wide peak when at least half the members peak then
        let threshold = (set.routes.len() / 2).max(1);
        let peak_hours = hour_counts
            .into_iter()
            .filter(|(_, count)| *count >= threshold)
            .map(|(hour, _)| hour)
            .collect();

        Ok(RouteSetAnalysis {
            set_id: set.id.clone(),
            route_count: set.routes.len(),
            coverage_area: set.coverage.len() as f64 * CELL_AREA_KM2,
            average_metrics,
            peak_hours,
            reliability_score,
            analyzed_at: Utc::now(),
        })
    }

    /// Insert or replace the analytics for one route.
    pub async fn record_analytics(&self, analytics: RouteAnalytics) -> Result<()> {
        if analytics.route_id.trim().is_empty() {
            return Err(Error::validation("analytics route_id must not be empty"));
        }
        if !(0.0..=1.0).contains(&analytics.reliability) {
            return Err(Error::validation(format!(
                "reliability must be within [0, 1], got {}",
                analytics.reliability
            )));
        }
        if let Some(hour) = analytics.peak_hours.iter().find(|h| **h > 23) {
            return Err(Error::validation(format!("peak hour {} is not an hour of day", hour)));
        }
        debug!(route_id = %analytics.route_id, "analytics recorded");
        self.registry
            .write()
            .await
            .analytics
            .insert(analytics.route_id.clone(), analytics);
        Ok(())
    }

    pub async fn analytics(&self, route_id: &str) -> Option<RouteAnalytics> {
        self.registry.read().await.analytics.get(route_id).cloned()
    }

    pub async fn route_set(&self, set_id: &str) -> Option<RouteSet> {
        self.registry
            .read()
            .await
            .sets
            .get(set_id)
            .map(|entry| entry.set.clone())
    }

    /// Every registered set, oldest first.
    pub async fn route_sets(&self) -> Vec<RouteSet> {
        let mut sets: Vec<RouteSet> = self
            .registry
            .read()
            .await
            .sets
            .values()
            .map(|entry| entry.set.clone())
            .collect();
        sets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sets
    }

    /// Every route id that belongs to at least one set, sorted.
    pub async fn route_ids(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        let ids: BTreeSet<&String> = registry
            .sets
            .values()
            .flat_map(|entry| entry.set.routes.iter())
            .collect();
        ids.into_iter().cloned().collect()
    }

    /// Ids of the sets containing `route_id`, sorted.
    pub async fn sets_containing(&self, route_id: &str) -> Vec<String> {
        let registry = self.registry.read().await;
        let mut ids: Vec<String> = registry
            .sets
            .values()
            .filter(|entry| entry.set.routes.iter().any(|id| id == route_id))
            .map(|entry| entry.set.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Cells covered by each member of a set.
    pub async fn member_cells(&self, set_id: &str) -> Result<HashMap<String, HashSet<CellId>>> {
        self.registry
            .read()
            .await
            .sets
            .get(set_id)
            .map(|entry| entry.member_cells.clone())
            .ok_or_else(|| Error::route_set_not_found(set_id))
    }

    pub async fn remove_route_set(&self, set_id: &str) -> Result<RouteSet> {
        let removed = self
            .registry
            .write()
            .await
            .sets
            .remove(set_id)
            .ok_or_else(|| Error::route_set_not_found(set_id))?;
        info!(set_id, "route set removed");
        Ok(removed.set)
    }
}

impl std::fmt::Debug for RoutePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePlanner")
            .field("strategy", &self.strategy.name())
            .field("search", &self.search)
            .finish()
    }
}

/// Pickup cell, destination cell, and the cells along the line between them.
fn route_cells(route: &Route) -> Result<HashSet<CellId>> {
    let pickup = match route.pickup_cell {
        Some(cell) => cell,
        None => cell_for_location(&route.pickup(), SEARCH_RESOLUTION)?,
    };
    let dest = match route.dest_cell {
        Some(cell) => cell,
        None => cell_for_location(&route.destination(), SEARCH_RESOLUTION)?,
    };
    let mut cells: HashSet<CellId> =
        interpolated_path(&route.pickup(), &route.destination(), SEARCH_RESOLUTION)?
            .into_iter()
            .collect();
    cells.insert(pickup);
    cells.insert(dest);
    Ok(cells)
}

fn coverage_of(members: &[String], cells: &HashMap<String, HashSet<CellId>>) -> HashSet<CellId> {
    members
        .iter()
        .filter_map(|id| cells.get(id))
        .flatten()
        .copied()
        .collect()
}

fn base_metrics(analytics: &RouteAnalytics) -> RouteMetrics {
    HashMap::from([
        (METRIC_RELIABILITY.to_string(), analytics.reliability),
        (METRIC_USAGE.to_string(), analytics.usage_count as f64),
        (METRIC_PUNCTUALITY.to_string(), -analytics.average_delay),
    ])
}

fn validate_weights(weights: &Weights) -> Result<()> {
    if weights.is_empty() {
        return Err(Error::validation("optimization weights must not be empty"));
    }
    for (name, weight) in weights {
        if name.trim().is_empty() {
            return Err(Error::validation("optimization weight names must not be empty"));
        }
        if !weight.is_finite() || *weight < 0.0 {
            return Err(Error::validation(format!(
                "weight for '{}' must be a non-negative number, got {}",
                name, weight
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRouteStore;
    use crate::test_utils::{analytics, RouteBuilder};
    use std::time::Duration;

    async fn planner_with(routes: Vec<Route>) -> (Arc<InMemoryRouteStore>, RoutePlanner) {
        let store = Arc::new(InMemoryRouteStore::with_routes(routes).await);
        let planner = RoutePlanner::new(
            RouteSearch::new(store.clone()),
            Arc::new(RouteCache::new(Duration::from_secs(60))),
        );
        (store, planner)
    }

    fn weights(pairs: &[(&str, f64)]) -> Weights {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn weights_must_be_non_negative_and_present() {
        assert!(validate_weights(&Weights::new()).is_err());
        assert!(validate_weights(&weights(&[("usage", -1.0)])).is_err());
        assert!(validate_weights(&weights(&[("usage", f64::NAN)])).is_err());
        assert!(validate_weights(&weights(&[("usage", 0.0), ("reliability", 1.0)])).is_ok());
    }

    #[tokio::test]
    async fn second_create_is_served_from_cache() {
        let (store, planner) = planner_with(vec![RouteBuilder::new("46").build()]).await;
        let criteria = SearchCriteria::default().near(-1.2865, 36.815);

        let first = planner.create_route_set("a", &criteria).await.unwrap();
        let second = planner.create_route_set("b", &criteria).await.unwrap();

        assert_eq!(store.query_count(), 1);
        assert_eq!(first.routes, second.routes);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn coverage_includes_both_endpoints() {
        let route = RouteBuilder::new("46").build();
        let pickup = route.pickup_cell.unwrap();
        let dest = route.dest_cell.unwrap();
        let (_, planner) = planner_with(vec![route]).await;

        let set = planner
            .create_route_set("cbd", &SearchCriteria::default())
            .await
            .unwrap();
        assert!(set.coverage.contains(&pickup));
        assert!(set.coverage.contains(&dest));
    }

    #[tokio::test]
    async fn record_analytics_rejects_out_of_range_values() {
        let (_, planner) = planner_with(Vec::new()).await;
        assert!(planner.record_analytics(analytics("r", 1, 0.0, 1.5)).await.is_err());

        let mut bad_hour = analytics("r", 1, 0.0, 0.5);
        bad_hour.peak_hours = vec![24];
        assert!(planner.record_analytics(bad_hour).await.is_err());
        assert!(planner.analytics("r").await.is_none());
    }
}
