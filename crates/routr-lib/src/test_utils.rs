// Test-only helpers for `routr-lib` tests and dependent crates (feature `test-utils`)
#![allow(dead_code)]

use chrono::{DateTime, Utc};

use crate::model::{FareInfo, Route, RouteAnalytics, Schedule};
use crate::spatial::{cell_for, SEARCH_RESOLUTION};

/// Pickup point used by [`RouteBuilder`] unless overridden (Nairobi CBD).
pub const DEFAULT_PICKUP: (f64, f64) = (-1.2865, 36.815);

/// Destination used by [`RouteBuilder`] unless overridden.
pub const DEFAULT_DESTINATION: (f64, f64) = (-1.3000, 36.7800);

/// Builder to create `Route` instances in tests with sensible defaults.
///
/// Cells are derived from the coordinates at build time, the same way the
/// store derives them on upsert.
pub struct RouteBuilder {
    route: Route,
}

impl RouteBuilder {
    #[must_use]
    pub fn new(route_number: &str) -> Self {
        Self {
            route: Route {
                id: String::new(),
                route_number: route_number.to_string(),
                pickup_point: "Kencom".to_string(),
                destinations: vec!["Ngong Road".to_string()],
                pickup_cell: None,
                dest_cell: None,
                pickup_lat: DEFAULT_PICKUP.0,
                pickup_lng: DEFAULT_PICKUP.1,
                dest_lat: DEFAULT_DESTINATION.0,
                dest_lng: DEFAULT_DESTINATION.1,
                schedule: Vec::new(),
                fare: FareInfo {
                    regular: 50.0,
                    peak: 80.0,
                    off_peak: 40.0,
                },
                active_days: vec!["Monday".to_string(), "Friday".to_string()],
                last_updated: DateTime::<Utc>::UNIX_EPOCH,
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.route.id = id.to_string();
        self
    }

    pub fn pickup_point(mut self, name: &str) -> Self {
        self.route.pickup_point = name.to_string();
        self
    }

    pub fn pickup(mut self, lat: f64, lng: f64) -> Self {
        self.route.pickup_lat = lat;
        self.route.pickup_lng = lng;
        self
    }

    pub fn destination(mut self, lat: f64, lng: f64) -> Self {
        self.route.dest_lat = lat;
        self.route.dest_lng = lng;
        self
    }

    pub fn destinations(mut self, names: &[&str]) -> Self {
        self.route.destinations = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn days(mut self, days: &[&str]) -> Self {
        self.route.active_days = days.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn fare(mut self, regular: f64) -> Self {
        self.route.fare.regular = regular;
        self
    }

    /// Add a service window (`HH:MM`) running every 15 minutes.
    pub fn window(mut self, start: &str, end: &str) -> Self {
        self.route.schedule.push(Schedule {
            start_time: start.to_string(),
            end_time: end.to_string(),
            frequency: 15,
        });
        self
    }

    #[must_use]
    pub fn build(mut self) -> Route {
        self.route.pickup_cell =
            cell_for(self.route.pickup_lat, self.route.pickup_lng, SEARCH_RESOLUTION).ok();
        self.route.dest_cell =
            cell_for(self.route.dest_lat, self.route.dest_lng, SEARCH_RESOLUTION).ok();
        self.route
    }
}

/// Analytics record with the given usage, delay, and reliability.
pub fn analytics(route_id: &str, usage: u64, delay: f64, reliability: f64) -> RouteAnalytics {
    RouteAnalytics {
        route_id: route_id.to_string(),
        usage_count: usage,
        average_delay: delay,
        peak_hours: Vec::new(),
        reliability,
        last_analyzed: Utc::now(),
    }
}
