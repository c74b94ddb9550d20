//! Fixtures for tests that need a populated engine.

use std::path::PathBuf;

use routr_lib::{EngineConfig, Route};

use crate::state::Engine;

/// Path to the shared Nairobi route fixture.
pub const ROUTES_FIXTURE_PATH: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../docs/fixtures/routes.json");

/// Route numbers present in the fixture.
pub mod fixture_routes {
    /// Kencom to Ngong Road, weekdays.
    pub const NGONG_ROAD: &str = "46";
    /// Kencom to Ngong town, next to route 46's pickup.
    pub const NGONG: &str = "111";
    /// Westlands to Uthiru, weekends only.
    pub const UTHIRU: &str = "23";
    /// Thika to the CBD, far from every other pickup.
    pub const THIKA: &str = "237";
}

/// Pickup of the two Kencom routes.
pub const KENCOM: (f64, f64) = (-1.2865, 36.815);

pub fn fixture_path() -> PathBuf {
    PathBuf::from(ROUTES_FIXTURE_PATH)
}

/// Parsed fixture routes.
///
/// # Panics
///
/// Panics if the fixture cannot be loaded, which indicates a broken checkout.
pub fn sample_routes() -> Vec<Route> {
    Engine::load_routes(fixture_path())
        .unwrap_or_else(|e| panic!("failed to load route fixture: {}", e))
}

/// In-memory engine seeded with [`sample_routes`]. Returns the store ids in
/// fixture order.
///
/// # Panics
///
/// Panics if seeding fails.
pub async fn test_engine() -> (Engine, Vec<String>) {
    let engine = Engine::in_memory(EngineConfig::default())
        .unwrap_or_else(|e| panic!("failed to build engine: {}", e));
    let ids = engine
        .seed(&sample_routes())
        .await
        .unwrap_or_else(|e| panic!("failed to seed engine: {}", e));
    (engine, ids)
}
