//! Output formatting for command results.
//!
//! Every command builds a serializable result and hands it to [`emit`] with a
//! text renderer; `--format json` bypasses the renderer.

use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use routr_lib::{Route, RouteSet, RouteSetAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Print `value` as JSON or through `text`.
pub fn emit<T, F>(format: OutputFormat, value: &T, text: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => print!("{}", text(value)),
    }
    Ok(())
}

/// One line per route: number, pickup, destinations, regular fare.
pub fn format_routes_text(routes: &[Route]) -> String {
    if routes.is_empty() {
        return "No routes matched.\n".to_string();
    }
    let mut out = String::new();
    for route in routes {
        let _ = writeln!(
            out,
            "{:<6} {} -> {}  (fare {:.2})",
            route.route_number,
            display_or(&route.pickup_point, "?"),
            display_or(&route.destinations.join(", "), "?"),
            route.fare.regular
        );
    }
    let _ = writeln!(out, "{} route(s)", routes.len());
    out
}

pub fn format_route_set_text(set: &RouteSet, route_numbers: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Route set {} ({})", set.name, set.id);
    for (rank, number) in route_numbers.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", rank + 1, number);
    }
    let _ = writeln!(out, "Coverage: {} cell(s)", set.coverage.len());
    out
}

pub fn format_analysis_text(analysis: &RouteSetAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Routes:       {}", analysis.route_count);
    let _ = writeln!(out, "Coverage:     {:.2} km2", analysis.coverage_area);
    let _ = writeln!(out, "Reliability:  {:.2}", analysis.reliability_score);
    let peaks: Vec<String> = analysis
        .peak_hours
        .iter()
        .map(|h| format!("{:02}:00", h))
        .collect();
    let _ = writeln!(
        out,
        "Peak hours:   {}",
        if peaks.is_empty() {
            "none".to_string()
        } else {
            peaks.join(", ")
        }
    );
    for (name, value) in &analysis.average_metrics {
        let _ = writeln!(out, "  {:<12} {:.2}", name, value);
    }
    out
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap, HashSet};

    fn route(number: &str) -> Route {
        serde_json::from_value(serde_json::json!({
            "route_number": number,
            "pickup_point": "Kencom",
            "destinations": ["Ngong Road", "Karen"],
            "pickup_lat": -1.2865,
            "pickup_lng": 36.815,
            "dest_lat": -1.3,
            "dest_lng": 36.78,
            "fare": { "regular_fare": 50.0 },
            "last_updated": "2026-01-05T06:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn routes_text_lists_each_route() {
        let text = format_routes_text(&[route("46"), route("111")]);
        assert!(text.contains("46     Kencom -> Ngong Road, Karen  (fare 50.00)"));
        assert!(text.ends_with("2 route(s)\n"));
    }

    #[test]
    fn empty_routes_text() {
        assert_eq!(format_routes_text(&[]), "No routes matched.\n");
    }

    #[test]
    fn route_set_text_ranks_members() {
        let set = RouteSet {
            id: "set-1".to_string(),
            name: "kencom".to_string(),
            routes: vec!["0x2".to_string(), "0x1".to_string()],
            coverage: HashSet::new(),
            properties: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let text = format_route_set_text(&set, &["111".to_string(), "46".to_string()]);
        assert!(text.contains("  1. 111\n  2. 46\n"));
        assert!(text.contains("Coverage: 0 cell(s)"));
    }

    #[test]
    fn analysis_text_formats_peaks() {
        let analysis = RouteSetAnalysis {
            set_id: "set-1".to_string(),
            route_count: 2,
            coverage_area: 1.2,
            average_metrics: BTreeMap::from([("reliability".to_string(), 0.75)]),
            peak_hours: vec![7, 17],
            reliability_score: 0.75,
            analyzed_at: Utc::now(),
        };
        let text = format_analysis_text(&analysis);
        assert!(text.contains("Peak hours:   07:00, 17:00"));
        assert!(text.contains("Coverage:     1.20 km2"));
    }
}
