//! `plan` subcommand: build, optimize, and analyze one route set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::debug;

use routr_lib::planner::{METRIC_PUNCTUALITY, METRIC_RELIABILITY, METRIC_USAGE};
use routr_lib::{Route, RouteAnalytics, RouteSet, RouteSetAnalysis, Weights};
use routr_service_shared::Engine;

use crate::commands::search::{load_engine, CriteriaArgs};
use crate::output::{emit, format_analysis_text, format_route_set_text, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// JSON file holding an array of routes.
    #[arg(long)]
    pub routes: PathBuf,
    /// JSON file holding per-route analytics keyed by route number.
    #[arg(long)]
    pub analytics: Option<PathBuf>,
    #[arg(long, default_value = "plan")]
    pub name: String,
    /// Optimization weight as NAME=VALUE; repeatable.
    #[arg(long = "weight", value_parser = parse_weight)]
    pub weights: Vec<(String, f64)>,
    #[command(flatten)]
    pub criteria: CriteriaArgs,
}

impl PlanArgs {
    /// Weights given on the command line, or the reliability-first default.
    pub fn weights(&self) -> Weights {
        if self.weights.is_empty() {
            return default_weights();
        }
        self.weights.iter().cloned().collect()
    }
}

pub fn default_weights() -> Weights {
    HashMap::from([
        (METRIC_RELIABILITY.to_string(), 0.5),
        (METRIC_USAGE.to_string(), 0.3),
        (METRIC_PUNCTUALITY.to_string(), 0.2),
    ])
}

fn parse_weight(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE but got '{}'", raw))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid weight '{}': {}", value.trim(), e))?;
    Ok((name.trim().to_string(), value))
}

/// Analytics as written by hand: keyed by route number, not store id.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsEntry {
    pub route_number: String,
    pub usage_count: u64,
    #[serde(rename = "avg_delay_minutes", default)]
    pub average_delay: f64,
    #[serde(default)]
    pub peak_hours: Vec<u32>,
    #[serde(rename = "reliability_score")]
    pub reliability: f64,
}

#[derive(Debug, Serialize)]
pub struct PlanOutput {
    pub set: RouteSet,
    /// Route numbers in ranked order.
    pub route_numbers: Vec<String>,
    pub analysis: RouteSetAnalysis,
}

fn load_analytics(path: &Path) -> Result<Vec<AnalyticsEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read analytics from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse analytics from {}", path.display()))
}

/// Expand entries to every stored route carrying their route number.
fn resolve_analytics(
    entries: Vec<AnalyticsEntry>,
    numbers_by_id: &HashMap<String, String>,
) -> Result<Vec<RouteAnalytics>> {
    let mut resolved = Vec::new();
    for entry in entries {
        let ids: Vec<&String> = numbers_by_id
            .iter()
            .filter(|(_, number)| **number == entry.route_number)
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return Err(anyhow!(
                "analytics reference unknown route number '{}'",
                entry.route_number
            ));
        }
        for id in ids {
            resolved.push(RouteAnalytics {
                route_id: id.clone(),
                usage_count: entry.usage_count,
                average_delay: entry.average_delay,
                peak_hours: entry.peak_hours.clone(),
                reliability: entry.reliability,
                last_analyzed: Utc::now(),
            });
        }
    }
    Ok(resolved)
}

pub async fn handle_plan(args: &PlanArgs, format: OutputFormat) -> Result<()> {
    let (engine, routes) = load_engine(&args.routes).await?;
    let result = plan(&engine, &routes, args).await;
    engine.shutdown().await;
    let output = result?;

    emit(format, &output, |o| {
        format!(
            "{}\n{}",
            format_route_set_text(&o.set, &o.route_numbers),
            format_analysis_text(&o.analysis)
        )
    })
}

async fn plan(engine: &Engine, routes: &[Route], args: &PlanArgs) -> Result<PlanOutput> {
    let numbers_by_id: HashMap<String, String> = routes
        .iter()
        .map(|r| (r.id.clone(), r.route_number.clone()))
        .collect();

    let planner = engine.planner();
    if let Some(path) = &args.analytics {
        for analytics in resolve_analytics(load_analytics(path)?, &numbers_by_id)? {
            planner
                .record_analytics(analytics)
                .await
                .context("invalid analytics")?;
        }
    }

    let set = planner
        .create_route_set(&args.name, &args.criteria.to_criteria())
        .await
        .context("failed to create route set")?;
    let set = planner
        .optimize_route_set(&set.id, &args.weights())
        .await
        .context("failed to optimize route set")?;
    let analysis = planner
        .analyze_route_set(&set.id)
        .await
        .context("failed to analyze route set")?;
    debug!(set_id = %set.id, routes = set.routes.len(), "planned route set");

    let route_numbers = set
        .routes
        .iter()
        .map(|id| numbers_by_id.get(id).cloned().unwrap_or_else(|| id.clone()))
        .collect();
    Ok(PlanOutput {
        set,
        route_numbers,
        analysis,
    })
}
