//! Search result cache.
//!
//! Keys are opaque strings (see [`SearchCriteria::cache_key`]). A single
//! reader/writer lock guards the whole map: any number of concurrent readers,
//! one exclusive writer, no per-key locking. Entries are only replaced by a
//! later `set` or dropped by [`RouteCache::purge_stale`].
//!
//! `get` reports presence only. Max-age enforcement is a separate, explicit
//! call ([`RouteCache::get_fresh`]) so that callers choose when staleness
//! matters.
//!
//! [`SearchCriteria::cache_key`]: crate::model::SearchCriteria::cache_key

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::Route;

#[derive(Debug, Clone)]
struct CacheEntry {
    routes: Arc<Vec<Route>>,
    stored_at: DateTime<Utc>,
}

/// Concurrent key to route-list cache with one process-wide max age.
#[derive(Debug)]
pub struct RouteCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_age: Duration,
}

impl RouteCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Store `routes` under `key`, replacing any previous entry.
    pub async fn set(&self, key: impl Into<String>, routes: Vec<Route>) {
        let key = key.into();
        debug!(key = %key, routes = routes.len(), "cache set");
        self.entries.write().await.insert(
            key,
            CacheEntry {
                routes: Arc::new(routes),
                stored_at: Utc::now(),
            },
        );
    }

    /// Routes stored under `key`, regardless of age.
    pub async fn get(&self, key: &str) -> Option<Arc<Vec<Route>>> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.routes.clone())
    }

    /// Routes stored under `key` if the entry is no older than the max age.
    pub async fn get_fresh(&self, key: &str) -> Option<Arc<Vec<Route>>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if self.is_fresh(entry.stored_at, Utc::now()) {
            metrics::counter!("routr_cache_lookups_total", "outcome" => "hit").increment(1);
            Some(entry.routes.clone())
        } else {
            metrics::counter!("routr_cache_lookups_total", "outcome" => "stale").increment(1);
            None
        }
    }

    /// Age of the entry under `key`.
    pub async fn age(&self, key: &str) -> Option<Duration> {
        let stored_at = self.entries.read().await.get(key)?.stored_at;
        (Utc::now() - stored_at).to_std().ok().or(Some(Duration::ZERO))
    }

    /// Drop every entry older than the max age. Returns how many were removed.
    pub async fn purge_stale(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry.stored_at, now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_fresh(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - stored_at).to_std() {
            Ok(age) => age <= self.max_age,
            // stored in the future relative to `now`: clock skew, treat as fresh
            Err(_) => true,
        }
    }

    #[cfg(test)]
    async fn backdate(&self, key: &str, by: Duration) {
        if let Some(entry) = self.entries.write().await.get_mut(key) {
            entry.stored_at -= chrono::Duration::from_std(by).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RouteBuilder;

    fn routes(numbers: &[&str]) -> Vec<Route> {
        numbers.iter().map(|n| RouteBuilder::new(n).build()).collect()
    }

    #[tokio::test]
    async fn set_then_get_returns_routes() {
        let cache = RouteCache::new(Duration::from_secs(60));
        cache.set("a", routes(&["1", "2"])).await;
        cache.set("b", routes(&["3"])).await;

        let hit = cache.get("a").await.expect("present");
        assert_eq!(hit.len(), 2);
        assert_eq!(hit[0].route_number, "1");
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn set_overwrites() {
        let cache = RouteCache::new(Duration::from_secs(60));
        cache.set("a", routes(&["1", "2"])).await;
        cache.set("a", routes(&["9"])).await;

        let hit = cache.get("a").await.unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].route_number, "9");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn get_ignores_age_but_get_fresh_does_not() {
        let cache = RouteCache::new(Duration::from_secs(60));
        cache.set("a", routes(&["1"])).await;
        cache.backdate("a", Duration::from_secs(120)).await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get_fresh("a").await.is_none());
    }

    #[tokio::test]
    async fn purge_stale_removes_only_expired() {
        let cache = RouteCache::new(Duration::from_secs(60));
        cache.set("old", routes(&["1"])).await;
        cache.set("new", routes(&["2"])).await;
        cache.backdate("old", Duration::from_secs(61)).await;

        assert_eq!(cache.purge_stale().await, 1);
        assert!(cache.get("old").await.is_none());
        assert!(cache.get_fresh("new").await.is_some());
    }

    #[tokio::test]
    async fn concurrent_readers_and_writers() {
        let cache = Arc::new(RouteCache::new(Duration::from_secs(60)));
        let mut tasks = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let key = format!("k{}", i % 4);
                cache.set(key.clone(), routes(&["1"])).await;
                cache.get(&key).await.is_some()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(cache.len().await, 4);
    }
}
