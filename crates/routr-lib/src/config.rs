//! Engine configuration.
//!
//! # Environment Variables
//!
//! - `ROUTR_CACHE_MAX_AGE_SECS`: search cache max age (default: 900)
//! - `ROUTR_UPDATE_QUEUE_CAPACITY`: real-time update queue capacity (default: 1000)
//! - `ROUTR_HEALTH_CHECK_INTERVAL_SECS`: health monitor period (default: 300)
//! - `ROUTR_MODEL_MAX_AGE_HOURS`: predictive model freshness window (default: 24)
//! - `ROUTR_STORE_TIMEOUT_MS`: deadline for each store call (default: 10000)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables shared by the cache, search, planner, and real-time manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub cache_max_age: Duration,
    pub update_queue_capacity: usize,
    pub health_check_interval: Duration,
    pub model_max_age: Duration,
    pub store_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_max_age: Duration::from_secs(15 * 60),
            update_queue_capacity: 1000,
            health_check_interval: Duration::from_secs(5 * 60),
            model_max_age: Duration::from_secs(24 * 60 * 60),
            store_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl EngineConfig {
    /// Build configuration from `ROUTR_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cache_max_age = parse_u64(&lookup, "ROUTR_CACHE_MAX_AGE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_max_age);
        let update_queue_capacity = parse_u64(&lookup, "ROUTR_UPDATE_QUEUE_CAPACITY")?
            .map(|v| v as usize)
            .unwrap_or(defaults.update_queue_capacity);
        let health_check_interval = parse_u64(&lookup, "ROUTR_HEALTH_CHECK_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.health_check_interval);
        let model_max_age = match parse_u64(&lookup, "ROUTR_MODEL_MAX_AGE_HOURS")? {
            Some(hours) => hours
                .checked_mul(60 * 60)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    Error::validation(format!(
                        "ROUTR_MODEL_MAX_AGE_HOURS={} overflows a duration",
                        hours
                    ))
                })?,
            None => defaults.model_max_age,
        };
        // 0 disables the store deadline
        let store_timeout = match parse_u64(&lookup, "ROUTR_STORE_TIMEOUT_MS")? {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.store_timeout,
        };

        let config = Self {
            cache_max_age,
            update_queue_capacity,
            health_check_interval,
            model_max_age,
            store_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.update_queue_capacity == 0 {
            return Err(Error::validation("update queue capacity must be at least 1"));
        }
        if self.health_check_interval.is_zero() {
            return Err(Error::validation("health check interval must be non-zero"));
        }
        Ok(())
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| Error::validation(format!("failed to parse {}='{}': {}", key, raw, e))),
    }
}
