//! Route records, search criteria, and route-set types.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::spatial::{CellId, Location};

/// Format used for schedule times (`HH:MM`).
pub const TIME_FORMAT: &str = "%H:%M";

/// A transit route as persisted in the route store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Store-assigned identifier; empty until the route has been persisted.
    #[serde(rename = "uid", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub route_number: String,
    #[serde(default)]
    pub pickup_point: String,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_cell: Option<CellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_cell: Option<CellId>,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
    #[serde(default)]
    pub schedule: Vec<Schedule>,
    #[serde(default)]
    pub fare: FareInfo,
    #[serde(default)]
    pub active_days: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl Route {
    pub fn pickup(&self) -> Location {
        Location::new(self.pickup_lat, self.pickup_lng)
    }

    pub fn destination(&self) -> Location {
        Location::new(self.dest_lat, self.dest_lng)
    }

    /// Whether any schedule window contains `time`.
    pub fn runs_at(&self, time: NaiveTime) -> bool {
        self.schedule.iter().any(|entry| entry.covers(time))
    }
}

/// One service window of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Window start, `HH:MM`.
    pub start_time: String,
    /// Window end, `HH:MM`. An end before the start wraps past midnight.
    pub end_time: String,
    #[serde(rename = "frequency_minutes")]
    pub frequency: u32,
}

impl Schedule {
    /// Whether the window contains `time`. Unparseable windows contain nothing.
    pub fn covers(&self, time: NaiveTime) -> bool {
        let (Ok(start), Ok(end)) = (
            NaiveTime::parse_from_str(self.start_time.trim(), TIME_FORMAT),
            NaiveTime::parse_from_str(self.end_time.trim(), TIME_FORMAT),
        ) else {
            return false;
        };

        if start <= end {
            start <= time && time <= end
        } else {
            time >= start || time <= end
        }
    }
}

/// Fare levels for a route.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FareInfo {
    #[serde(rename = "regular_fare", default)]
    pub regular: f64,
    #[serde(rename = "peak_fare", default)]
    pub peak: f64,
    #[serde(rename = "off_peak_fare", default)]
    pub off_peak: f64,
}

/// Multi-criteria search request. Absent fields leave the search unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near_location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Maximum distance in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fare: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<NaiveTime>,
}

impl SearchCriteria {
    pub fn near(mut self, lat: f64, lng: f64) -> Self {
        self.near_location = Some(Location::new(lat, lng));
        self
    }

    pub fn to_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn within(mut self, metres: f64) -> Self {
        self.max_distance = Some(metres);
        self
    }

    pub fn on_day(mut self, day: impl Into<String>) -> Self {
        self.day_of_week = Some(day.into());
        self
    }

    pub fn max_fare(mut self, fare: f64) -> Self {
        self.max_fare = Some(fare);
        self
    }

    pub fn at(mut self, time: NaiveTime) -> Self {
        self.time_of_day = Some(time);
        self
    }

    /// Reject criteria the store or the fine filters cannot interpret.
    pub fn validate(&self) -> Result<()> {
        if let Some(location) = &self.near_location {
            location.validate()?;
        }
        if let Some(max) = self.max_distance {
            if !max.is_finite() || max < 0.0 {
                return Err(Error::validation(format!(
                    "max_distance must be a non-negative number, got {}",
                    max
                )));
            }
        }
        if let Some(max) = self.max_fare {
            if !max.is_finite() || max < 0.0 {
                return Err(Error::validation(format!(
                    "max_fare must be a non-negative number, got {}",
                    max
                )));
            }
        }
        Ok(())
    }

    /// Criteria with blank terms removed and terms case-folded.
    pub fn normalized(&self) -> Self {
        fn term(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_lowercase)
        }

        Self {
            near_location: self.near_location,
            destination: term(&self.destination),
            max_distance: self.max_distance,
            day_of_week: term(&self.day_of_week),
            max_fare: self.max_fare,
            time_of_day: self.time_of_day,
        }
    }

    /// Stable cache key: hex SHA-256 of the normalized criteria.
    pub fn cache_key(&self) -> String {
        let canonical = serde_json::to_vec(&self.normalized()).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

/// Named set of routes with derived spatial coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSet {
    pub id: String,
    pub name: String,
    #[serde(rename = "route_ids")]
    pub routes: Vec<String>,
    pub coverage: HashSet<CellId>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Usage and performance metrics tracked per route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAnalytics {
    pub route_id: String,
    pub usage_count: u64,
    #[serde(rename = "avg_delay_minutes")]
    pub average_delay: f64,
    /// Hours of day (0-23) with peak usage.
    #[serde(default)]
    pub peak_hours: Vec<u32>,
    /// Reliability score in [0, 1].
    #[serde(rename = "reliability_score")]
    pub reliability: f64,
    pub last_analyzed: DateTime<Utc>,
}

/// Point-in-time analysis of a route set. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSetAnalysis {
    pub set_id: String,
    pub route_count: usize,
    #[serde(rename = "coverage_area_km2")]
    pub coverage_area: f64,
    pub average_metrics: BTreeMap<String, f64>,
    pub peak_hours: Vec<u32>,
    pub reliability_score: f64,
    pub analyzed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: &str, end: &str) -> Schedule {
        Schedule {
            start_time: start.to_string(),
            end_time: end.to_string(),
            frequency: 15,
        }
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn schedule_window_contains_time() {
        let morning = window("06:00", "10:00");
        assert!(morning.covers(hm(8, 0)));
        assert!(morning.covers(hm(6, 0)));
        assert!(!morning.covers(hm(10, 1)));
    }

    #[test]
    fn overnight_window_wraps() {
        let night = window("22:00", "02:00");
        assert!(night.covers(hm(23, 30)));
        assert!(night.covers(hm(1, 0)));
        assert!(!night.covers(hm(12, 0)));
    }

    #[test]
    fn malformed_window_covers_nothing() {
        assert!(!window("morning", "10:00").covers(hm(8, 0)));
    }

    #[test]
    fn cache_key_ignores_case_and_blank_terms() {
        let a = SearchCriteria::default().to_destination("Ngong Road").on_day(" ");
        let b = SearchCriteria::default().to_destination("  ngong road ");
        assert_eq!(a.cache_key(), b.cache_key());

        let c = SearchCriteria::default().to_destination("Thika Road");
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn validate_rejects_negative_limits() {
        assert!(SearchCriteria::default().within(-1.0).validate().is_err());
        assert!(SearchCriteria::default().max_fare(f64::NAN).validate().is_err());
        assert!(SearchCriteria::default().near(91.0, 0.0).validate().is_err());
        assert!(SearchCriteria::default().validate().is_ok());
    }

    #[test]
    fn fare_uses_store_field_names() {
        let fare: FareInfo =
            serde_json::from_str(r#"{"regular_fare":50,"peak_fare":80,"off_peak_fare":40}"#)
                .unwrap();
        assert_eq!(fare.regular, 50.0);
        assert_eq!(fare.peak, 80.0);
        assert_eq!(fare.off_peak, 40.0);
    }
}
