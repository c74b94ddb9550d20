//! Route health scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spatial::CellId;

/// Congestion above which a tracked cell penalizes the route.
pub const HEAVY_TRAFFIC_CONGESTION: f64 = 0.8;
/// Score multiplier applied per heavily congested cell.
pub const HEAVY_TRAFFIC_PENALTY: f64 = 0.8;
/// Model accuracy below which the route is penalized.
pub const LOW_ACCURACY_THRESHOLD: f64 = 0.7;
/// Score multiplier applied for a low-accuracy model.
pub const LOW_ACCURACY_PENALTY: f64 = 0.9;
/// Score below which the route's sets are re-optimized.
pub const REOPTIMIZE_BELOW: f64 = 0.5;

pub const ISSUE_HEAVY_TRAFFIC: &str = "Heavy traffic detected";
pub const ISSUE_LOW_ACCURACY: &str = "Low prediction accuracy";

/// Outcome of one health evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub route_id: String,
    #[serde(rename = "health_score")]
    pub score: f64,
    pub issues: Vec<String>,
    #[serde(rename = "last_checked")]
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn needs_reoptimization(&self) -> bool {
        self.score < REOPTIMIZE_BELOW
    }
}

/// Score a route from the congestion of its tracked cells and its model accuracy.
///
/// `accuracy` is `None` when the route has no model, which is not penalized.
pub fn evaluate<I>(route_id: &str, congestion: I, accuracy: Option<f64>) -> HealthReport
where
    I: IntoIterator<Item = (CellId, f64)>,
{
    let mut score = 1.0;
    let mut issues = Vec::new();

    let mut congested: Vec<(CellId, f64)> = congestion
        .into_iter()
        .filter(|(_, level)| *level > HEAVY_TRAFFIC_CONGESTION)
        .collect();
    congested.sort_by_key(|(cell, _)| cell.to_string());
    for (cell, level) in congested {
        score *= HEAVY_TRAFFIC_PENALTY;
        debug!(route_id, cell = %cell, congestion = level, "heavy traffic on tracked cell");
        issues.push(ISSUE_HEAVY_TRAFFIC.to_string());
    }

    if let Some(accuracy) = accuracy {
        if accuracy < LOW_ACCURACY_THRESHOLD {
            score *= LOW_ACCURACY_PENALTY;
            debug!(route_id, accuracy, "prediction accuracy below threshold");
            issues.push(ISSUE_LOW_ACCURACY.to_string());
        }
    }

    HealthReport {
        route_id: route_id.to_string(),
        score,
        issues,
        checked_at: Utc::now(),
    }
}
