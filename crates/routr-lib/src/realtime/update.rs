use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::health::HealthReport;
use super::model::{HistoricalRecord, TrafficData};
use crate::spatial::Location;

/// One event on the real-time update queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteUpdate {
    /// Route the update concerns; empty for area-wide traffic.
    pub route_id: String,
    pub kind: UpdateKind,
    pub timestamp: DateTime<Utc>,
}

/// Typed payload of a [`RouteUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "update_type", content = "data", rename_all = "snake_case")]
pub enum UpdateKind {
    Traffic(TrafficData),
    Demand(HistoricalRecord),
    Incident(Incident),
    HealthIssue(HealthReport),
}

impl UpdateKind {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateKind::Traffic(_) => "traffic",
            UpdateKind::Demand(_) => "demand",
            UpdateKind::Incident(_) => "incident",
            UpdateKind::HealthIssue(_) => "health_issue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Reported disruption on a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(rename = "type")]
    pub kind: String,
    pub location: Location,
    pub severity: Severity,
}

impl RouteUpdate {
    fn now(route_id: impl Into<String>, kind: UpdateKind) -> Self {
        Self {
            route_id: route_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn traffic(data: TrafficData) -> Self {
        Self::now(String::new(), UpdateKind::Traffic(data))
    }

    pub fn demand(record: HistoricalRecord) -> Self {
        Self::now(record.route_id.clone(), UpdateKind::Demand(record))
    }

    pub fn incident(route_id: impl Into<String>, incident: Incident) -> Self {
        Self::now(route_id, UpdateKind::Incident(incident))
    }

    pub fn health_issue(report: HealthReport) -> Self {
        Self::now(report.route_id.clone(), UpdateKind::HealthIssue(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incident_wire_shape() {
        let update = RouteUpdate::incident(
            "route-123",
            Incident {
                kind: "accident".to_string(),
                location: Location::new(-1.2865, 36.815),
                severity: Severity::High,
            },
        );
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["kind"]["update_type"], "incident");
        assert_eq!(value["kind"]["data"]["type"], "accident");
        assert_eq!(value["kind"]["data"]["severity"], "high");
        assert_eq!(update.kind.name(), "incident");
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
