//! Live traffic records and the per-route bucketed demand estimator.
//!
//! The estimator is deliberately simple: hourly means of the training records,
//! with the overall mean filling hours that have no data. The most recent
//! fifth of the history is held out to score accuracy.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::spatial::CellId;

/// Share of the history (most recent first) held out for accuracy scoring.
pub const HOLDOUT_FRACTION: f64 = 0.2;

/// Source tag for traffic recorded through the producer helper.
pub const SENSOR_SOURCE: &str = "real-time-sensors";

/// Latest traffic observation for one cell. Later observations replace earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficData {
    pub cell: CellId,
    pub speed_kmh: f64,
    /// Congestion level in [0, 1].
    #[serde(rename = "congestion_level")]
    pub congestion: f64,
    #[serde(rename = "last_updated")]
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl TrafficData {
    /// Sensor observation stamped now; congestion is clamped into [0, 1].
    pub fn new(cell: CellId, speed_kmh: f64, congestion: f64) -> Self {
        Self {
            cell,
            speed_kmh: speed_kmh.max(0.0),
            congestion: if congestion.is_nan() { 0.0 } else { congestion.clamp(0.0, 1.0) },
            timestamp: Utc::now(),
            source: SENSOR_SOURCE.to_string(),
        }
    }

    /// Bring an externally built observation into range.
    ///
    /// NaN congestion or a non-finite speed is rejected. Congestion outside
    /// [0, 1] is clamped and negative speed becomes 0.
    pub fn sanitized(self) -> Result<Self> {
        if self.congestion.is_nan() {
            return Err(Error::validation(format!(
                "congestion for cell {} is not a number",
                self.cell
            )));
        }
        if !self.speed_kmh.is_finite() {
            return Err(Error::validation(format!(
                "speed for cell {} must be finite, got {}",
                self.cell, self.speed_kmh
            )));
        }
        Ok(Self {
            congestion: self.congestion.clamp(0.0, 1.0),
            speed_kmh: self.speed_kmh.max(0.0),
            ..self
        })
    }
}

/// One historical observation of a route, as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub route_id: String,
    pub recorded_at: DateTime<Utc>,
    pub demand: f64,
    pub travel_time_minutes: f64,
    pub on_time: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "expected_demand")]
    pub demand: f64,
    #[serde(rename = "expected_travel_time")]
    pub travel_time_minutes: f64,
    #[serde(rename = "reliability_score")]
    pub reliability: f64,
}

/// Hour-of-day demand estimator for one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveModel {
    pub route_id: String,
    /// Hour of day (0-23) to prediction. Empty when there was nothing to train on.
    pub predictions: BTreeMap<u32, Prediction>,
    /// `1 - mean absolute percentage error` on the held-out records, in [0, 1].
    #[serde(rename = "accuracy_score")]
    pub accuracy: f64,
    pub last_trained: DateTime<Utc>,
    pub samples: usize,
}

#[derive(Default)]
struct Bucket {
    demand: f64,
    travel: f64,
    on_time: usize,
    count: usize,
}

impl Bucket {
    fn add(&mut self, record: &HistoricalRecord) {
        self.demand += record.demand;
        self.travel += record.travel_time_minutes;
        self.on_time += usize::from(record.on_time);
        self.count += 1;
    }

    fn mean(&self) -> Prediction {
        let n = self.count as f64;
        Prediction {
            demand: self.demand / n,
            travel_time_minutes: self.travel / n,
            reliability: self.on_time as f64 / n,
        }
    }
}

impl PredictiveModel {
    /// Train on `records`, ignoring entries for other routes.
    pub fn train(route_id: &str, records: &[HistoricalRecord]) -> Self {
        let mut history: Vec<&HistoricalRecord> = records
            .iter()
            .filter(|r| r.route_id == route_id && r.demand.is_finite())
            .collect();
        history.sort_by_key(|r| r.recorded_at);

        let holdout = (history.len() as f64 * HOLDOUT_FRACTION).floor() as usize;
        let (training, held_out) = history.split_at(history.len() - holdout);

        let mut overall = Bucket::default();
        let mut hourly: BTreeMap<u32, Bucket> = BTreeMap::new();
        for record in training {
            overall.add(record);
            hourly.entry(record.recorded_at.hour()).or_default().add(record);
        }

        let predictions = if overall.count == 0 {
            BTreeMap::new()
        } else {
            let fallback = overall.mean();
            (0..24)
                .map(|hour| {
                    let prediction = hourly.get(&hour).map(Bucket::mean).unwrap_or(fallback);
                    (hour, prediction)
                })
                .collect()
        };

        let mut model = Self {
            route_id: route_id.to_string(),
            predictions,
            accuracy: 0.0,
            last_trained: Utc::now(),
            samples: training.len(),
        };
        model.accuracy = model.score(held_out);
        model
    }

    fn score(&self, held_out: &[&HistoricalRecord]) -> f64 {
        if held_out.is_empty() || self.predictions.is_empty() {
            return 0.0;
        }
        let mape = held_out
            .iter()
            .filter_map(|record| {
                let predicted = self.predict(record.recorded_at.hour())?.demand;
                Some((predicted - record.demand).abs() / record.demand.abs().max(1.0))
            })
            .sum::<f64>()
            / held_out.len() as f64;
        (1.0 - mape).clamp(0.0, 1.0)
    }

    pub fn predict(&self, hour: u32) -> Option<&Prediction> {
        self.predictions.get(&hour)
    }

    /// Prediction for the hour containing `at`.
    pub fn predict_at(&self, at: DateTime<Utc>) -> Option<&Prediction> {
        self.predict(at.hour())
    }

    /// Whether the model was trained no longer than `max_age` before `now`.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.last_trained).to_std() {
            Ok(age) => age <= max_age,
            Err(_) => true,
        }
    }
}
