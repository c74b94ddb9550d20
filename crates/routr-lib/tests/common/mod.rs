#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use routr_lib::{
    upsert_route, FareInfo, InMemoryRouteStore, Route, RouteCache, RoutePlanner, RouteSearch,
    Schedule,
};

pub const NAIROBI_CBD: (f64, f64) = (-1.2865, 36.815);
pub const NGONG_ROAD: (f64, f64) = (-1.3000, 36.7800);
pub const WESTLANDS: (f64, f64) = (-1.2676, 36.8108);
pub const THIKA: (f64, f64) = (-1.0333, 37.0693);

pub fn route(number: &str, pickup: (f64, f64), dest: (f64, f64)) -> Route {
    Route {
        id: String::new(),
        route_number: number.to_string(),
        pickup_point: "Kencom".to_string(),
        destinations: vec!["Ngong Road".to_string(), "Karen".to_string()],
        pickup_cell: None,
        dest_cell: None,
        pickup_lat: pickup.0,
        pickup_lng: pickup.1,
        dest_lat: dest.0,
        dest_lng: dest.1,
        schedule: vec![Schedule {
            start_time: "06:00".to_string(),
            end_time: "22:00".to_string(),
            frequency: 10,
        }],
        fare: FareInfo {
            regular: 50.0,
            peak: 80.0,
            off_peak: 40.0,
        },
        active_days: vec!["Monday".to_string(), "Tuesday".to_string()],
        last_updated: Utc::now(),
    }
}

/// Store holding `routes`, persisted through `upsert_route`; returns the assigned ids in order.
pub async fn seeded_store(routes: Vec<Route>) -> (Arc<InMemoryRouteStore>, Vec<String>) {
    let store = Arc::new(InMemoryRouteStore::new());
    let mut ids = Vec::new();
    for route in &routes {
        ids.push(upsert_route(store.as_ref(), route).await.expect("route persists"));
    }
    (store, ids)
}

pub fn planner(store: Arc<InMemoryRouteStore>) -> Arc<RoutePlanner> {
    Arc::new(RoutePlanner::new(
        RouteSearch::new(store),
        Arc::new(RouteCache::new(Duration::from_secs(900))),
    ))
}
