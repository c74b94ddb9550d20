//! routr library entry points.
//!
//! This crate implements a real-time geospatial route-planning engine: routes
//! are indexed by hexagonal cell, searched with combined spatial, textual and
//! numeric criteria, grouped into route sets that can be optimized and
//! analyzed, and kept current by a stream of traffic, demand and incident
//! updates feeding per-route predictive models and health monitors.
//!
//! Persistence is delegated to a [`RouteStore`]. Higher-level consumers (CLI,
//! services) should only depend on the items exported here.

#![deny(warnings)]

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod planner;
pub mod realtime;
pub mod search;
pub mod spatial;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::RouteCache;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use model::{
    FareInfo, Route, RouteAnalytics, RouteSet, RouteSetAnalysis, Schedule, SearchCriteria,
};
pub use planner::{LinearScoring, RouteMetrics, RoutePlanner, ScoringStrategy, Weights};
pub use realtime::{
    HealthReport, HistoricalRecord, Incident, Prediction, PredictiveModel, RealTimeManager,
    RouteUpdate, Severity, TrafficData, UpdateKind,
};
pub use search::RouteSearch;
pub use spatial::{
    cell_for, distance, interpolated_path, ring_neighbors, CellId, DistanceUnit, Location,
};
pub use store::{upsert_route, InMemoryRouteStore, MutationAck, QueryVariables, RouteStore};
