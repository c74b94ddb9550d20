//! Persistence collaborator contract.
//!
//! The engine never talks to a database directly. It builds query text and
//! mutation payloads, hands them to a [`RouteStore`], and decodes the JSON that
//! comes back. Any graph database that can honour [`ROUTE_SCHEMA`] can sit
//! behind the trait; [`InMemoryRouteStore`] is the in-process implementation
//! used by tests and the CLI.

mod memory;

pub use memory::InMemoryRouteStore;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Route;
use crate::realtime::HistoricalRecord;
use crate::spatial::{cell_for_location, SEARCH_RESOLUTION};

/// Variables bound into a store query.
pub type QueryVariables = Map<String, Value>;

/// Operation name of the route search query.
pub const SEARCH_ROUTES: &str = "SearchRoutes";

/// Operation name of the per-route history query.
pub const ROUTE_HISTORY: &str = "RouteHistory";

/// Record type tag carried by every mutation payload.
pub const TYPE_FIELD: &str = "type";

/// Indexing scheme the store must provide for search to behave as documented.
pub const ROUTE_SCHEMA: &str = r#"
    route_number: string @index(exact) .
    pickup_point: string @index(term) .
    destinations: [string] @index(term) .
    pickup_cell: string @index(exact) .
    dest_cell: string @index(exact) .
    pickup_lat: float .
    pickup_lng: float .
    dest_lat: float .
    dest_lng: float .
    schedule: [uid] @reverse .
    fare: uid @reverse .
    active_days: [string] @index(term) .
    last_updated: datetime @index(hour) .
    route_id: string @index(exact) .
    recorded_at: datetime @index(hour) .

    type Route {
        route_number
        pickup_point
        destinations
        pickup_cell
        dest_cell
        pickup_lat
        pickup_lng
        dest_lat
        dest_lng
        schedule
        fare
        active_days
        last_updated
    }

    type Schedule {
        start_time
        end_time
        frequency_minutes
    }

    type FareInfo {
        regular_fare
        peak_fare
        off_peak_fare
    }

    type Observation {
        route_id
        recorded_at
        demand
        travel_time_minutes
        on_time
    }
"#;

const HISTORY_QUERY: &str = r#"query RouteHistory($route: string) {
    history(func: eq(route_id, $route)) @filter(type(Observation)) {
        route_id
        recorded_at
        demand
        travel_time_minutes
        on_time
    }
}"#;

/// Acknowledgment returned by a committed or pending mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationAck {
    /// Blank-node name to store-assigned id.
    #[serde(default)]
    pub uids: HashMap<String, String>,
    pub committed: bool,
}

/// Backing graph-query/persistence service.
///
/// Implementations must be safe to call concurrently. Every call may suspend
/// and may fail; callers never hold engine locks across these calls.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Run a read-only query and return the serialized JSON result.
    async fn query(&self, query: &str, variables: &QueryVariables) -> Result<String>;

    /// Apply a JSON mutation, committing immediately when `commit_now` is set.
    async fn mutate(&self, payload: &Value, commit_now: bool) -> Result<MutationAck>;
}

/// Await a store call, failing with [`Error::Timeout`] once `timeout` elapses.
pub(crate) async fn with_deadline<T, F>(
    operation: &str,
    timeout: Option<Duration>,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        None => call.await,
        Some(after) => tokio::time::timeout(after, call)
            .await
            .map_err(|_| Error::Timeout {
                operation: operation.to_string(),
                after,
            })?,
    }
}

/// Persist a route: derive its cells, stamp `last_updated`, and commit.
///
/// Returns the store id of the route (newly assigned for unsaved routes).
pub async fn upsert_route(store: &dyn RouteStore, route: &Route) -> Result<String> {
    let mut route = route.clone();
    route.pickup_cell = Some(cell_for_location(&route.pickup(), SEARCH_RESOLUTION)?);
    route.dest_cell = Some(cell_for_location(&route.destination(), SEARCH_RESOLUTION)?);
    route.last_updated = Utc::now();

    let mut payload = serde_json::to_value(&route).map_err(|e| Error::store("upsert_route", e))?;
    if let Value::Object(fields) = &mut payload {
        if route.id.is_empty() {
            fields.insert("uid".to_string(), Value::String("_:route".to_string()));
        }
        fields.insert(TYPE_FIELD.to_string(), Value::String("Route".to_string()));
    }

    let ack = store.mutate(&payload, true).await?;
    let id = if route.id.is_empty() {
        ack.uids.get("route").cloned().ok_or_else(|| {
            Error::store("upsert_route", "store did not assign an id to the new route")
        })?
    } else {
        route.id
    };

    debug!(route_id = %id, route_number = %route.route_number, "route upserted");
    Ok(id)
}

/// Mutation payload persisting one historical observation.
pub fn observation_payload(record: &HistoricalRecord) -> Result<Value> {
    let mut payload =
        serde_json::to_value(record).map_err(|e| Error::store("observation_payload", e))?;
    if let Value::Object(fields) = &mut payload {
        fields.insert("uid".to_string(), Value::String("_:observation".to_string()));
        fields.insert(TYPE_FIELD.to_string(), Value::String("Observation".to_string()));
    }
    Ok(payload)
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<HistoricalRecord>,
}

/// Every observation recorded for `route_id`.
pub async fn fetch_history(
    store: &dyn RouteStore,
    route_id: &str,
    timeout: Option<Duration>,
) -> Result<Vec<HistoricalRecord>> {
    let mut variables = QueryVariables::new();
    variables.insert("route".to_string(), Value::String(route_id.to_string()));

    let raw = with_deadline(ROUTE_HISTORY, timeout, store.query(HISTORY_QUERY, &variables)).await?;
    let response: HistoryResponse = serde_json::from_str(&raw).map_err(|source| Error::Decode {
        operation: ROUTE_HISTORY.to_string(),
        source,
    })?;
    debug!(route_id, records = response.history.len(), "route history fetched");
    Ok(response.history)
}
