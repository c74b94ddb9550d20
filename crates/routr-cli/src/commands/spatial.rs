//! Spatial tool subcommands: `cell`, `ring`, `distance`, `path`.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use routr_lib::spatial::SEARCH_RESOLUTION;
use routr_lib::{
    cell_for, distance, interpolated_path, ring_neighbors, CellId, DistanceUnit, Location,
};

use crate::commands::parse_coordinate;
use crate::output::{emit, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct CellArgs {
    /// Point as LAT,LNG.
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub at: Location,
    /// Cell resolution (0-15).
    #[arg(long, default_value_t = SEARCH_RESOLUTION)]
    pub resolution: u8,
}

#[derive(Args, Debug, Clone)]
pub struct RingArgs {
    /// Point as LAT,LNG.
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub at: Location,
    #[arg(long, default_value_t = SEARCH_RESOLUTION)]
    pub resolution: u8,
    /// Ring radius in cells.
    #[arg(short, long, default_value_t = 1)]
    pub k: u32,
}

#[derive(Args, Debug, Clone)]
pub struct DistanceArgs {
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub from: Location,
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub to: Location,
    /// Unit code: M (miles), K (kilometers), or N (nautical miles).
    #[arg(long, default_value = "M", value_parser = parse_unit)]
    pub unit: DistanceUnit,
}

#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub from: Location,
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    pub to: Location,
    #[arg(long, default_value_t = SEARCH_RESOLUTION)]
    pub resolution: u8,
}

fn parse_unit(raw: &str) -> Result<DistanceUnit, String> {
    DistanceUnit::from_code(raw)
        .ok_or_else(|| format!("unknown distance unit '{}' (expected M, K, or N)", raw))
}

#[derive(Debug, Serialize)]
pub struct CellOutput {
    pub location: Location,
    pub resolution: u8,
    pub cell: CellId,
    /// Centroid of `cell`.
    pub center: Location,
}

#[derive(Debug, Serialize)]
pub struct RingOutput {
    pub origin: CellId,
    pub k: u32,
    pub cells: Vec<CellId>,
}

#[derive(Debug, Serialize)]
pub struct DistanceOutput {
    pub from: Location,
    pub to: Location,
    pub unit: DistanceUnit,
    pub distance: f64,
}

#[derive(Debug, Serialize)]
pub struct PathOutput {
    pub from: Location,
    pub to: Location,
    pub resolution: u8,
    pub cells: Vec<CellId>,
}

pub fn handle_cell(args: &CellArgs, format: OutputFormat) -> Result<()> {
    let cell = cell_for(args.at.lat, args.at.lng, args.resolution)
        .context("failed to index point")?;
    debug!(cell = %cell, resolution = args.resolution, "indexed point");
    let output = CellOutput {
        location: args.at,
        resolution: args.resolution,
        cell,
        center: cell.center(),
    };
    emit(format, &output, |o| format!("{}\n", o.cell))
}

pub fn handle_ring(args: &RingArgs, format: OutputFormat) -> Result<()> {
    let origin = cell_for(args.at.lat, args.at.lng, args.resolution)
        .context("failed to index point")?;
    let mut cells: Vec<CellId> = ring_neighbors(origin, args.k).into_iter().collect();
    cells.sort_by_key(|c| c.to_string());
    debug!(origin = %origin, k = args.k, cells = cells.len(), "expanded ring");

    let output = RingOutput {
        origin,
        k: args.k,
        cells,
    };
    emit(format, &output, |o| lines(&o.cells))
}

pub fn handle_distance(args: &DistanceArgs, format: OutputFormat) -> Result<()> {
    let output = DistanceOutput {
        from: args.from,
        to: args.to,
        unit: args.unit,
        distance: distance(&args.from, &args.to, args.unit),
    };
    emit(format, &output, |o| format!("{:.2} {}\n", o.distance, o.unit))
}

pub fn handle_path(args: &PathArgs, format: OutputFormat) -> Result<()> {
    let cells = interpolated_path(&args.from, &args.to, args.resolution)
        .context("failed to interpolate path")?;
    debug!(cells = cells.len(), "interpolated path");
    let output = PathOutput {
        from: args.from,
        to: args.to,
        resolution: args.resolution,
        cells,
    };
    emit(format, &output, |o| lines(&o.cells))
}

fn lines(cells: &[CellId]) -> String {
    let mut out = String::new();
    for cell in cells {
        let _ = writeln!(out, "{}", cell);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_codes() {
        assert_eq!(parse_unit("k").unwrap(), DistanceUnit::Kilometers);
        assert_eq!(parse_unit("N").unwrap(), DistanceUnit::NauticalMiles);
        assert!(parse_unit("furlongs").is_err());
    }

    #[test]
    fn lines_one_cell_per_line() {
        let a = cell_for(-1.2865, 36.815, 9).unwrap();
        let b = cell_for(-1.3, 36.78, 9).unwrap();
        assert_eq!(lines(&[a, b]), format!("{}\n{}\n", a, b));
    }

    #[test]
    fn cell_center_reindexes_to_the_same_cell() {
        let cell = cell_for(-1.2865, 36.815, 9).unwrap();
        let center = cell.center();
        assert_eq!(cell_for(center.lat, center.lng, 9).unwrap(), cell);
    }
}
