//! Prometheus metrics for routr binaries.
//!
//! The engine records its own counters and gauges through the `metrics`
//! facade; this module installs the Prometheus recorder that collects them,
//! registers their descriptions, and offers a few helpers for metrics that
//! only binaries know about.
//!
//! # Example
//!
//! ```no_run
//! use routr_service_shared::metrics::{init_metrics, render_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::from_env()).expect("failed to initialize metrics");
//! println!("{}", render_metrics());
//! ```

use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub const SEARCHES_TOTAL: &str = "routr_searches_total";
pub const SEARCH_RESULTS: &str = "routr_search_results";
pub const CACHE_LOOKUPS_TOTAL: &str = "routr_cache_lookups_total";
pub const ROUTE_SETS_CREATED_TOTAL: &str = "routr_route_sets_created_total";
pub const ROUTE_SETS_OPTIMIZED_TOTAL: &str = "routr_route_sets_optimized_total";
pub const UPDATES_PROCESSED_TOTAL: &str = "routr_updates_processed_total";
pub const UPDATES_REJECTED_TOTAL: &str = "routr_updates_rejected_total";
pub const HEALTH_SCORE: &str = "routr_health_score";
pub const COMMANDS_TOTAL: &str = "routr_commands_total";
pub const ROUTES_LOADED: &str = "routr_routes_loaded";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl MetricsConfig {
    /// `METRICS_ENABLED`: "false" disables metrics (default: enabled).
    pub fn from_env() -> Self {
        let enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        Self { enabled }
    }
}

/// Install the Prometheus recorder and describe the engine's metrics.
///
/// # Errors
///
/// Fails when metrics are disabled, when a recorder is already installed, or
/// when the builder cannot install.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }
    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;
    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    describe_metrics();
    tracing::debug!("prometheus recorder installed");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(SEARCHES_TOTAL, "Route searches by outcome");
    metrics::describe_histogram!(SEARCH_RESULTS, Unit::Count, "Routes returned per search");
    metrics::describe_counter!(CACHE_LOOKUPS_TOTAL, "Search cache lookups by outcome");
    metrics::describe_counter!(ROUTE_SETS_CREATED_TOTAL, "Route sets created");
    metrics::describe_counter!(ROUTE_SETS_OPTIMIZED_TOTAL, "Route set optimizations applied");
    metrics::describe_counter!(UPDATES_PROCESSED_TOTAL, "Real-time updates processed by kind and outcome");
    metrics::describe_counter!(UPDATES_REJECTED_TOTAL, "Real-time updates rejected at the queue");
    metrics::describe_gauge!(HEALTH_SCORE, "Latest health score per route");
    metrics::describe_counter!(COMMANDS_TOTAL, "CLI commands by name and outcome");
    metrics::describe_gauge!(ROUTES_LOADED, Unit::Count, "Routes loaded into the store at startup");
}

pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Prometheus exposition text, or a comment line when metrics are not initialized.
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# Metrics not initialized\n".to_string())
}

#[derive(Debug, Clone)]
pub enum MetricsError {
    Disabled,
    AlreadyInitialized,
    InstallFailed(String),
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::Disabled => write!(f, "metrics are disabled"),
            MetricsError::AlreadyInitialized => write!(f, "metrics recorder already initialized"),
            MetricsError::InstallFailed(e) => {
                write!(f, "failed to install metrics recorder: {}", e)
            }
        }
    }
}

impl std::error::Error for MetricsError {}

// =============================================================================
// Binary-level metric helpers
// =============================================================================

/// Count one CLI command execution.
pub fn record_command(command: &str, success: bool) {
    metrics::counter!(
        COMMANDS_TOTAL,
        "command" => command.to_string(),
        "outcome" => if success { "ok" } else { "error" }
    )
    .increment(1);
}

/// Record how many routes were loaded into the store at startup.
pub fn record_routes_loaded(count: usize) {
    metrics::gauge!(ROUTES_LOADED).set(count as f64);
}
