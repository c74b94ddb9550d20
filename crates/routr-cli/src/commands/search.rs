//! `search` subcommand: load a routes fixture and run one search.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::Args;
use tracing::debug;

use routr_lib::{Location, Route, SearchCriteria};
use routr_service_shared::Engine;

use crate::commands::parse_coordinate;
use crate::output::{emit, format_routes_text, OutputFormat};

/// Search filters shared by `search` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct CriteriaArgs {
    /// Only routes picking up within one cell ring of LAT,LNG.
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub near: Option<Location>,
    /// Destination term, matched case-insensitively.
    #[arg(long)]
    pub destination: Option<String>,
    /// Maximum distance in metres from --near (or trip length without it).
    #[arg(long)]
    pub max_distance: Option<f64>,
    /// Day of week the route must run on.
    #[arg(long)]
    pub day: Option<String>,
    #[arg(long)]
    pub max_fare: Option<f64>,
    /// Time of day (HH:MM) a schedule window must contain.
    #[arg(long, value_parser = parse_time)]
    pub at: Option<NaiveTime>,
}

impl CriteriaArgs {
    pub fn to_criteria(&self) -> SearchCriteria {
        SearchCriteria {
            near_location: self.near,
            destination: self.destination.clone(),
            max_distance: self.max_distance,
            day_of_week: self.day.clone(),
            max_fare: self.max_fare,
            time_of_day: self.at,
        }
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| format!("invalid time '{}' (expected HH:MM): {}", raw, e))
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// JSON file holding an array of routes.
    #[arg(long)]
    pub routes: PathBuf,
    #[command(flatten)]
    pub criteria: CriteriaArgs,
}

/// Load `--routes` into a fresh in-memory engine. The returned routes carry
/// their store ids.
pub async fn load_engine(routes: &Path) -> Result<(Engine, Vec<Route>)> {
    let engine = Engine::from_env().context("failed to build engine")?;
    let mut fixture = Engine::load_routes(routes)?;
    let ids = engine
        .seed(&fixture)
        .await
        .with_context(|| format!("failed to load routes from {}", routes.display()))?;
    for (route, id) in fixture.iter_mut().zip(ids) {
        route.id = id;
    }
    debug!(path = %routes.display(), count = fixture.len(), "seeded routes");
    Ok((engine, fixture))
}

pub async fn handle_search(args: &SearchArgs, format: OutputFormat) -> Result<()> {
    let (engine, _) = load_engine(&args.routes).await?;
    let criteria = args.criteria.to_criteria();

    let result = engine.search().search_routes(&criteria).await;
    engine.shutdown().await;
    let routes = result.context("search failed")?;
    debug!(matched = routes.len(), "search complete");

    emit(format, &routes, |r| format_routes_text(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_carry_every_filter() {
        let args = CriteriaArgs {
            near: Some(Location::new(-1.2865, 36.815)),
            destination: Some("Karen".to_string()),
            max_distance: Some(500.0),
            day: Some("Monday".to_string()),
            max_fare: Some(80.0),
            at: Some(NaiveTime::from_hms_opt(7, 30, 0).unwrap()),
        };
        let criteria = args.to_criteria();
        assert_eq!(criteria.destination.as_deref(), Some("Karen"));
        assert_eq!(criteria.max_distance, Some(500.0));
        assert_eq!(criteria.day_of_week.as_deref(), Some("Monday"));
        assert!(criteria.validate().is_ok());
    }

    #[test]
    fn empty_args_search_everything() {
        assert_eq!(CriteriaArgs::default().to_criteria(), SearchCriteria::default());
    }

    #[test]
    fn time_parser() {
        assert_eq!(
            parse_time("07:30").unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert!(parse_time("7.30pm").is_err());
    }
}
