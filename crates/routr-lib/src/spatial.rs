//! Hierarchical hexagonal cells and great-circle distance.
//!
//! Routes are indexed by the cell that contains their pickup and destination
//! points. Proximity filtering works on cells rather than raw coordinates: a
//! search near a location matches every route whose pickup cell falls within
//! the one-ring neighbourhood of the location's cell.
//!
//! # Overview
//!
//! - [`cell_for`] maps a coordinate to its cell at a resolution (0..=15)
//! - [`ring_neighbors`] returns the origin cell plus all cells within `k` rings
//! - [`interpolated_path`] samples the cells along a straight line
//! - [`distance`] computes spherical law-of-cosines distance
//!
//! # Example
//!
//! ```
//! use routr_lib::spatial::{cell_for, ring_neighbors, SEARCH_RESOLUTION};
//!
//! let cell = cell_for(-1.2865, 36.815, SEARCH_RESOLUTION).unwrap();
//! let ring = ring_neighbors(cell, 1);
//! assert!(ring.contains(&cell));
//! assert_eq!(ring.len(), 7);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Resolution used for route indexing and proximity search.
pub const SEARCH_RESOLUTION: u8 = 9;

/// Approximate area of one resolution-9 cell in square kilometres.
pub const CELL_AREA_KM2: f64 = 0.1;

/// One interpolation sample per this many distance units along a path.
const PATH_SAMPLE_SPACING: f64 = 100.0;

const MILES_PER_DEGREE_MINUTE: f64 = 1.1515;
const KM_PER_MILE: f64 = 1.609344;
const NAUTICAL_PER_MILE: f64 = 0.8684;

/// Identifier of a hexagonal cell.
///
/// Serialized as the canonical lowercase hexadecimal string so that store
/// records can use exact-match string indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(CellIndex);

impl CellId {
    /// Resolution of this cell.
    pub fn resolution(&self) -> u8 {
        u8::from(self.0.resolution())
    }

    /// Centre of the cell.
    pub fn center(&self) -> Location {
        let center = LatLng::from(self.0);
        Location {
            lat: center.lat(),
            lng: center.lng(),
        }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CellId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<CellIndex>()
            .map(CellId)
            .map_err(|e| Error::InvalidArgument {
                argument: "cell",
                message: format!("'{}' is not a valid cell id: {}", s, e),
            })
    }
}

impl Serialize for CellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check the point is finite and inside the valid latitude/longitude range.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::validation(format!(
                "latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::validation(format!(
                "longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Unit for [`distance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    /// Statute miles.
    #[default]
    Miles,
    Kilometers,
    NauticalMiles,
}

impl DistanceUnit {
    /// Parse the single-letter unit codes `M`, `K`, and `N`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "M" | "MI" | "MILES" => Some(DistanceUnit::Miles),
            "K" | "KM" | "KILOMETERS" => Some(DistanceUnit::Kilometers),
            "N" | "NM" | "NAUTICAL" => Some(DistanceUnit::NauticalMiles),
            _ => None,
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            DistanceUnit::Miles => "mi",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::NauticalMiles => "nmi",
        };
        f.write_str(value)
    }
}

fn resolution(value: u8) -> Result<Resolution> {
    Resolution::try_from(value).map_err(|e| Error::InvalidArgument {
        argument: "resolution",
        message: format!("{} is outside the supported range 0..=15: {}", value, e),
    })
}

/// Cell containing the point at the given resolution.
pub fn cell_for(lat: f64, lng: f64, resolution_level: u8) -> Result<CellId> {
    let res = resolution(resolution_level)?;
    let point = LatLng::new(lat, lng).map_err(|e| Error::InvalidArgument {
        argument: "coordinate",
        message: format!("({}, {}) is not a valid coordinate: {}", lat, lng, e),
    })?;
    Ok(CellId(point.to_cell(res)))
}

/// Cell containing `location` at the given resolution.
pub fn cell_for_location(location: &Location, resolution_level: u8) -> Result<CellId> {
    cell_for(location.lat, location.lng, resolution_level)
}

/// The origin cell plus every cell within `k` rings of it.
///
/// Away from pentagons a ring of radius `k` holds `3k(k+1) + 1` cells.
pub fn ring_neighbors(cell: CellId, k: u32) -> HashSet<CellId> {
    cell.0
        .grid_disk::<Vec<_>>(k)
        .into_iter()
        .map(CellId)
        .collect()
}

/// Cells sampled along the straight line from `from` to `to`.
///
/// The line is split into `max(1, floor(distance / 100))` segments (distance in
/// statute miles) and sampled at every segment boundary, endpoints included.
/// Consecutive samples that fall into the same cell are collapsed.
pub fn interpolated_path(from: &Location, to: &Location, resolution_level: u8) -> Result<Vec<CellId>> {
    let res = resolution(resolution_level)?;
    let span = distance(from, to, DistanceUnit::Miles);
    let segments = ((span / PATH_SAMPLE_SPACING).floor() as usize).max(1);

    let mut cells = Vec::with_capacity(segments + 1);
    for i in 0..=segments {
        let fraction = i as f64 / segments as f64;
        let lat = from.lat + (to.lat - from.lat) * fraction;
        let lng = from.lng + (to.lng - from.lng) * fraction;
        let point = LatLng::new(lat, lng).map_err(|e| Error::InvalidArgument {
            argument: "coordinate",
            message: format!("({}, {}) is not a valid coordinate: {}", lat, lng, e),
        })?;
        cells.push(CellId(point.to_cell(res)));
    }
    cells.dedup();
    Ok(cells)
}

/// Spherical law-of-cosines distance between two points.
pub fn distance(from: &Location, to: &Location, unit: DistanceUnit) -> f64 {
    if from.lat == to.lat && from.lng == to.lng {
        return 0.0;
    }

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let theta = (from.lng - to.lng).to_radians();

    let cosine = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * theta.cos();
    let degrees = cosine.clamp(-1.0, 1.0).acos().to_degrees();
    let miles = degrees * 60.0 * MILES_PER_DEGREE_MINUTE;

    match unit {
        DistanceUnit::Miles => miles,
        DistanceUnit::Kilometers => miles * KM_PER_MILE,
        DistanceUnit::NauticalMiles => miles * NAUTICAL_PER_MILE,
    }
}

/// Average speed over `dist` covered in `elapsed` units of time; zero when no time elapsed.
pub fn average_speed(elapsed: f64, dist: f64) -> f64 {
    if elapsed == 0.0 {
        return 0.0;
    }
    dist / elapsed
}
