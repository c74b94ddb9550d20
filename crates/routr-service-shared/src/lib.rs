//! Shared infrastructure for routr binaries.
//!
//! - [`Engine`]: every engine component wired over one route store
//! - [`logging`]: structured JSON or text logging setup
//! - [`metrics`]: Prometheus recorder and binary-level metric helpers
//!
//! All planning logic lives in `routr-lib`; this crate only assembles it.
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides the route fixture and a seeded engine.
//! Enable the `test-utils` feature to access it from dependent crates.

#![deny(warnings)]

pub mod logging;
pub mod metrics;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, prometheus_handle, record_command, record_routes_loaded, render_metrics,
    MetricsConfig, MetricsError,
};
pub use state::{Engine, EngineError};
