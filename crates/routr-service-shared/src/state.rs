//! Engine wiring shared by routr binaries.
//!
//! An [`Engine`] owns one instance of every engine component over a single
//! route store: the search cache, the search executor, the planner, and the
//! real-time manager. It is cheaply cloneable.

use std::path::Path;
use std::sync::Arc;

use routr_lib::{
    upsert_route, EngineConfig, Error as LibError, InMemoryRouteStore, RealTimeManager, Route,
    RouteCache, RoutePlanner, RouteSearch, RouteStore,
};

use crate::metrics::record_routes_loaded;

/// Error while building or seeding an [`Engine`].
#[derive(Debug)]
pub enum EngineError {
    /// Engine configuration was rejected.
    Config(LibError),

    /// Route fixture file not found.
    RoutesNotFound(String),

    /// Route fixture could not be read or parsed.
    RoutesInvalid { path: String, message: String },

    /// The store refused a route while seeding.
    Seed(LibError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid engine configuration: {}", e),
            Self::RoutesNotFound(path) => write!(f, "routes file not found: {}", path),
            Self::RoutesInvalid { path, message } => {
                write!(f, "failed to load routes from {}: {}", path, message)
            }
            Self::Seed(e) => write!(f, "failed to seed route store: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) | Self::Seed(e) => Some(e),
            _ => None,
        }
    }
}

/// Every engine component, built over one route store.
///
/// Must be constructed inside a Tokio runtime: the real-time manager spawns
/// its update consumer on creation.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> Result<(), routr_service_shared::EngineError> {
/// use routr_service_shared::Engine;
///
/// let engine = Engine::in_memory(Default::default())?;
/// let ids = engine.seed(&Engine::load_routes("routes.json")?).await?;
/// println!("seeded {} routes", ids.len());
/// engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn RouteStore>,
    cache: Arc<RouteCache>,
    search: RouteSearch,
    planner: Arc<RoutePlanner>,
    realtime: RealTimeManager,
}

impl Engine {
    /// Wire every component over `store`.
    pub fn new(store: Arc<dyn RouteStore>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;

        let cache = Arc::new(RouteCache::new(config.cache_max_age));
        let search = RouteSearch::new(store.clone()).with_timeout(config.store_timeout);
        let planner = Arc::new(RoutePlanner::new(search.clone(), cache.clone()));
        let realtime = RealTimeManager::new(store.clone(), planner.clone(), config.clone());

        tracing::info!(
            cache_max_age_secs = config.cache_max_age.as_secs(),
            queue_capacity = config.update_queue_capacity,
            "engine ready"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                cache,
                search,
                planner,
                realtime,
            }),
        })
    }

    /// Engine over a fresh [`InMemoryRouteStore`].
    pub fn in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        Self::new(Arc::new(InMemoryRouteStore::new()), config)
    }

    /// In-memory engine configured from `ROUTR_*` environment variables.
    pub fn from_env() -> Result<Self, EngineError> {
        let config = EngineConfig::from_env().map_err(EngineError::Config)?;
        Self::in_memory(config)
    }

    /// Read a JSON array of routes.
    pub fn load_routes(path: impl AsRef<Path>) -> Result<Vec<Route>, EngineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::RoutesNotFound(path.display().to_string()));
        }
        let invalid = |message: String| EngineError::RoutesInvalid {
            path: path.display().to_string(),
            message,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let routes: Vec<Route> = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
        tracing::debug!(path = %path.display(), count = routes.len(), "routes file parsed");
        Ok(routes)
    }

    /// Persist `routes` and return their store ids in input order.
    pub async fn seed(&self, routes: &[Route]) -> Result<Vec<String>, EngineError> {
        let mut ids = Vec::with_capacity(routes.len());
        for route in routes {
            let id = upsert_route(self.inner.store.as_ref(), route)
                .await
                .map_err(EngineError::Seed)?;
            ids.push(id);
        }
        record_routes_loaded(ids.len());
        tracing::info!(count = ids.len(), "route store seeded");
        Ok(ids)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn RouteStore> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<RouteCache> {
        &self.inner.cache
    }

    pub fn search(&self) -> &RouteSearch {
        &self.inner.search
    }

    pub fn planner(&self) -> &Arc<RoutePlanner> {
        &self.inner.planner
    }

    pub fn realtime(&self) -> &RealTimeManager {
        &self.inner.realtime
    }

    /// Stop health monitors and drain the update queue.
    pub async fn shutdown(&self) {
        self.inner.realtime.shutdown().await;
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
