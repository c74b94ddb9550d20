//! Multi-criteria route search.
//!
//! Search runs in two phases:
//!
//! 1. **Coarse filter** - one store query that combines the constraints the
//!    store indexes natively: pickup cell within the one-ring of the search
//!    location (exact index), destination terms, and active-day terms. Omitted
//!    criteria are left out of the query entirely.
//! 2. **Fine filter** - numeric constraints applied in-process to the decoded
//!    routes: maximum distance, maximum fare, and time of day.
//!
//! An empty result is a successful search.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Route, SearchCriteria};
use crate::spatial::{cell_for_location, distance, ring_neighbors, DistanceUnit, SEARCH_RESOLUTION};
use crate::store::{with_deadline, QueryVariables, RouteStore, SEARCH_ROUTES};

const ROUTE_FIELDS: &str = r#"
        uid
        route_number
        pickup_point
        destinations
        pickup_cell
        dest_cell
        pickup_lat
        pickup_lng
        dest_lat
        dest_lng
        schedule {
            start_time
            end_time
            frequency_minutes
        }
        fare {
            regular_fare
            peak_fare
            off_peak_fare
        }
        active_days
        last_updated"#;

/// Query text and bound variables for one search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub variables: QueryVariables,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    routes: Vec<Route>,
}

/// Build the coarse store query for `criteria`.
pub fn build_query(criteria: &SearchCriteria) -> Result<SearchQuery> {
    let criteria = criteria.normalized();
    let mut conditions = Vec::new();
    let mut params = Vec::new();
    let mut variables = QueryVariables::new();

    if let Some(location) = &criteria.near_location {
        let origin = cell_for_location(location, SEARCH_RESOLUTION)?;
        let mut cells: Vec<String> = ring_neighbors(origin, 1)
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        cells.sort();
        conditions.push("eq(pickup_cell, $cells)");
        params.push("$cells: [string]");
        variables.insert(
            "cells".to_string(),
            Value::Array(cells.into_iter().map(Value::String).collect()),
        );
    }

    if let Some(destination) = criteria.destination {
        conditions.push("anyofterms(destinations, $destination)");
        params.push("$destination: string");
        variables.insert("destination".to_string(), Value::String(destination));
    }

    if let Some(day) = criteria.day_of_week {
        conditions.push("anyofterms(active_days, $day)");
        params.push("$day: string");
        variables.insert("day".to_string(), Value::String(day));
    }

    let signature = if params.is_empty() {
        String::new()
    } else {
        format!("({})", params.join(", "))
    };
    let filter = if conditions.is_empty() {
        String::new()
    } else {
        format!(" @filter({})", conditions.join(" AND "))
    };

    let text = format!(
        "query {}{} {{\n    routes(func: type(Route)){} {{{}\n    }}\n}}",
        SEARCH_ROUTES, signature, filter, ROUTE_FIELDS
    );

    Ok(SearchQuery { text, variables })
}

/// In-process filters for constraints the store does not index.
pub fn apply_fine_filters(routes: Vec<Route>, criteria: &SearchCriteria) -> Vec<Route> {
    routes
        .into_iter()
        .filter(|route| within_distance(route, criteria))
        .filter(|route| {
            criteria
                .max_fare
                .map(|max| route.fare.regular <= max)
                .unwrap_or(true)
        })
        .filter(|route| {
            criteria
                .time_of_day
                .map(|time| route.runs_at(time))
                .unwrap_or(true)
        })
        .collect()
}

fn within_distance(route: &Route, criteria: &SearchCriteria) -> bool {
    let Some(max_metres) = criteria.max_distance else {
        return true;
    };
    let km = match &criteria.near_location {
        Some(location) => distance(location, &route.pickup(), DistanceUnit::Kilometers),
        None => distance(&route.pickup(), &route.destination(), DistanceUnit::Kilometers),
    };
    km * 1000.0 <= max_metres
}

/// Executes searches against a [`RouteStore`].
#[derive(Clone)]
pub struct RouteSearch {
    store: Arc<dyn RouteStore>,
    timeout: Option<Duration>,
}

impl RouteSearch {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Fail store calls that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn RouteStore> {
        &self.store
    }

    /// Run one search: coarse store query, decode, fine filters.
    pub async fn search_routes(&self, criteria: &SearchCriteria) -> Result<Vec<Route>> {
        criteria.validate()?;
        let query = build_query(criteria)?;

        let raw = with_deadline(
            SEARCH_ROUTES,
            self.timeout,
            self.store.query(&query.text, &query.variables),
        )
        .await
        .inspect_err(|e| {
            metrics::counter!("routr_searches_total", "outcome" => e.kind()).increment(1);
        })?;

        let response: SearchResponse = serde_json::from_str(&raw).map_err(|source| {
            metrics::counter!("routr_searches_total", "outcome" => "decode").increment(1);
            Error::Decode {
                operation: SEARCH_ROUTES.to_string(),
                source,
            }
        })?;

        let fetched = response.routes.len();
        let routes = apply_fine_filters(response.routes, criteria);

        metrics::counter!("routr_searches_total", "outcome" => "ok").increment(1);
        metrics::histogram!("routr_search_results").record(routes.len() as f64);
        debug!(fetched, kept = routes.len(), "search complete");
        if routes.is_empty() {
            info!("search matched no routes");
        }

        Ok(routes)
    }
}

impl std::fmt::Debug for RouteSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSearch")
            .field("timeout", &self.timeout)
            .finish()
    }
}
