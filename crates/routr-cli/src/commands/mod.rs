// Module exports for CLI subcommands.
//
// Each module owns the arguments and handler of one group of subcommands;
// main.rs only parses and dispatches.

pub mod plan;
pub mod search;
pub mod spatial;

use routr_lib::Location;

/// Parse a `LAT,LNG` pair in decimal degrees.
pub fn parse_coordinate(raw: &str) -> Result<Location, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG but got '{}'", raw))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude '{}': {}", lat.trim(), e))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude '{}': {}", lng.trim(), e))?;
    let location = Location::new(lat, lng);
    location.validate().map_err(|e| e.to_string())?;
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lat_lng_pairs() {
        let location = parse_coordinate("-1.2865, 36.815").unwrap();
        assert_eq!(location, Location::new(-1.2865, 36.815));
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(parse_coordinate("-1.2865").unwrap_err().contains("LAT,LNG"));
        assert!(parse_coordinate("north,36.8").unwrap_err().contains("latitude"));
        assert!(parse_coordinate("91,36.8").unwrap_err().contains("outside"));
    }
}
