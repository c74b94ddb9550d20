use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{MutationAck, QueryVariables, RouteStore, ROUTE_HISTORY, SEARCH_ROUTES, TYPE_FIELD};
use crate::error::{Error, Result};
use crate::model::Route;

/// In-process [`RouteStore`] holding routes and observations in memory.
///
/// Interprets the variables of the `SearchRoutes` and `RouteHistory` queries the
/// engine issues (`cells`, `destination`, `day`, `route`) with the same exact
/// and any-of-terms semantics the persisted schema declares. Failures, latency,
/// and raw responses can be injected to exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryRouteStore {
    data: RwLock<StoreData>,
    faults: RwLock<Faults>,
    queries: AtomicUsize,
    mutations: AtomicUsize,
}

#[derive(Debug, Default)]
struct StoreData {
    routes: Vec<Route>,
    observations: Vec<Value>,
    next_uid: u64,
}

#[derive(Debug, Default)]
struct Faults {
    query_error: Option<String>,
    mutate_error: Option<String>,
    raw_response: Option<String>,
    latency: Option<Duration>,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with routes; routes without ids get fresh ones.
    pub async fn with_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let store = Self::new();
        {
            let mut data = store.data.write().await;
            for route in routes {
                data.upsert(route);
            }
        }
        store
    }

    /// Every stored route, in insertion order.
    pub async fn routes(&self) -> Vec<Route> {
        self.data.read().await.routes.clone()
    }

    pub async fn route(&self, id: &str) -> Option<Route> {
        self.data
            .read()
            .await
            .routes
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.routes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.routes.is_empty()
    }

    /// Observation payloads recorded through mutations.
    pub async fn observations(&self) -> Vec<Value> {
        self.data.read().await.observations.clone()
    }

    /// Number of queries served so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make every subsequent query fail with `message` (`None` restores service).
    pub async fn fail_queries(&self, message: Option<&str>) {
        self.faults.write().await.query_error = message.map(str::to_string);
    }

    /// Make every subsequent mutation fail with `message` (`None` restores service).
    pub async fn fail_mutations(&self, message: Option<&str>) {
        self.faults.write().await.mutate_error = message.map(str::to_string);
    }

    /// Return `raw` verbatim from every subsequent query.
    pub async fn respond_with(&self, raw: Option<&str>) {
        self.faults.write().await.raw_response = raw.map(str::to_string);
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.faults.write().await.latency = latency;
    }

    async fn delay(&self) {
        let latency = self.faults.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl StoreData {
    fn assign_uid(&mut self) -> String {
        self.next_uid += 1;
        format!("0x{:x}", self.next_uid)
    }

    fn upsert(&mut self, mut route: Route) -> String {
        if route.id.is_empty() || route.id.starts_with("_:") {
            route.id = self.assign_uid();
        }
        let id = route.id.clone();
        match self.routes.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = route,
            None => self.routes.push(route),
        }
        id
    }
}

fn operation_name(query: &str) -> Option<&str> {
    let rest = query.trim_start().strip_prefix("query")?;
    let name = rest.trim_start();
    let end = name
        .find(|c: char| c == '(' || c == '{' || c.is_whitespace())
        .unwrap_or(name.len());
    Some(&name[..end])
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn any_of_terms(values: &[String], wanted: &str) -> bool {
    let wanted = terms(wanted);
    values
        .iter()
        .any(|value| !terms(value).is_disjoint(&wanted))
}

fn matches_search(route: &Route, variables: &QueryVariables) -> bool {
    if let Some(Value::Array(cells)) = variables.get("cells") {
        let Some(pickup) = route.pickup_cell.map(|c| c.to_string()) else {
            return false;
        };
        if !cells.iter().any(|c| c.as_str() == Some(pickup.as_str())) {
            return false;
        }
    }
    if let Some(Value::String(destination)) = variables.get("destination") {
        if !any_of_terms(&route.destinations, destination) {
            return false;
        }
    }
    if let Some(Value::String(day)) = variables.get("day") {
        if !any_of_terms(&route.active_days, day) {
            return false;
        }
    }
    true
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn query(&self, query: &str, variables: &QueryVariables) -> Result<String> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let operation = operation_name(query).unwrap_or_default().to_string();
        {
            let faults = self.faults.read().await;
            if let Some(message) = &faults.query_error {
                return Err(Error::store(operation, message));
            }
            if let Some(raw) = &faults.raw_response {
                return Ok(raw.clone());
            }
        }

        let data = self.data.read().await;
        let response = match operation.as_str() {
            SEARCH_ROUTES => {
                let routes: Vec<&Route> = data
                    .routes
                    .iter()
                    .filter(|r| matches_search(r, variables))
                    .collect();
                debug!(matched = routes.len(), "in-memory search served");
                json!({ "routes": routes })
            }
            ROUTE_HISTORY => {
                let route_id = variables.get("route").and_then(Value::as_str);
                let history: Vec<&Value> = data
                    .observations
                    .iter()
                    .filter(|o| o.get("route_id").and_then(Value::as_str) == route_id)
                    .collect();
                json!({ "history": history })
            }
            other => {
                return Err(Error::store(
                    other,
                    format!("unsupported query operation '{}'", other),
                ))
            }
        };

        serde_json::to_string(&response).map_err(|e| Error::store(operation, e))
    }

    async fn mutate(&self, payload: &Value, commit_now: bool) -> Result<MutationAck> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if let Some(message) = &self.faults.read().await.mutate_error {
            return Err(Error::store("mutate", message));
        }

        let mut ack = MutationAck {
            committed: commit_now,
            ..MutationAck::default()
        };
        let mut data = self.data.write().await;

        match payload.get(TYPE_FIELD).and_then(Value::as_str) {
            Some("Route") => {
                let blank = payload
                    .get("uid")
                    .and_then(Value::as_str)
                    .and_then(|uid| uid.strip_prefix("_:"))
                    .map(str::to_string);
                let route: Route = serde_json::from_value(payload.clone()).map_err(|e| {
                    Error::store("mutate", format!("payload is not a route: {}", e))
                })?;
                let id = data.upsert(route);
                if let Some(blank) = blank {
                    ack.uids.insert(blank, id);
                }
            }
            Some("Observation") => {
                let uid = data.assign_uid();
                data.observations.push(payload.clone());
                ack.uids.insert("observation".to_string(), uid);
            }
            other => {
                return Err(Error::store(
                    "mutate",
                    format!("unsupported record type {:?}", other),
                ))
            }
        }

        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RouteBuilder;

    #[test]
    fn operation_name_is_parsed() {
        assert_eq!(
            operation_name("query SearchRoutes($day: string) { }"),
            Some("SearchRoutes")
        );
        assert_eq!(operation_name("  query RouteHistory{ }"), Some("RouteHistory"));
        assert_eq!(operation_name("{ all }"), None);
    }

    #[test]
    fn term_matching_is_case_insensitive() {
        let values = vec!["Ngong Road".to_string(), "Karen".to_string()];
        assert!(any_of_terms(&values, "ngong"));
        assert!(any_of_terms(&values, "KAREN shopping"));
        assert!(!any_of_terms(&values, "Thika"));
    }

    #[tokio::test]
    async fn unknown_operation_is_store_error() {
        let store = InMemoryRouteStore::new();
        let err = store
            .query("query Nope { }", &QueryVariables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }

    #[tokio::test]
    async fn injected_query_failure_surfaces() {
        let store = InMemoryRouteStore::with_routes([RouteBuilder::new("1").build()]).await;
        store.fail_queries(Some("connection reset")).await;
        let err = store
            .query("query SearchRoutes { }", &QueryVariables::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(store.query_count(), 1);
    }
}
