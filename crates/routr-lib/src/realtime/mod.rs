//! Real-time update pipeline, predictive models, and route health monitoring.
//!
//! # Overview
//!
//! A [`RealTimeManager`] owns a bounded update queue drained by exactly one
//! consumer task. Producers never block indefinitely: [`RealTimeManager::submit`]
//! rejects with [`Error::QueueFull`] at capacity and
//! [`RealTimeManager::submit_timeout`] waits at most the given deadline. The
//! consumer dispatches by update kind:
//!
//! - traffic replaces the per-cell entry (last write wins)
//! - demand persists the observation and retrains the route's model
//! - incidents are recorded; high-severity ones re-optimize the route's sets
//! - health issues are logged and broadcast to [`RealTimeManager::subscribe_health`]
//!
//! Health monitors run one task per watched route and can be cancelled
//! individually. Live state sits behind its own lock, separate from the
//! planner registry and the search cache, and no lock is held across a store
//! call.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use routr_lib::{RealTimeManager, RoutePlanner, RouteStore, EngineConfig, cell_for};
//! # async fn demo(store: Arc<dyn RouteStore>, planner: Arc<RoutePlanner>) -> routr_lib::Result<()> {
//! let manager = RealTimeManager::new(store, planner, EngineConfig::default());
//! manager.update_traffic(cell_for(-1.2865, 36.815, 9)?, 45.5, 0.3)?;
//! manager.monitor_route_health("0x1").await;
//! // ...
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod health;
pub mod model;
pub mod update;

pub use health::{evaluate, HealthReport};
pub use model::{HistoricalRecord, Prediction, PredictiveModel, TrafficData};
pub use update::{Incident, RouteUpdate, Severity, UpdateKind};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::RouteSet;
use crate::planner::{RouteMetrics, RoutePlanner, Weights};
use crate::spatial::CellId;
use crate::store::{fetch_history, observation_payload, with_deadline, RouteStore};

/// Signal derived from live congestion on a route's cells (1 = free flowing).
pub const SIGNAL_CURRENT_TRAFFIC: &str = "current_traffic";
/// Signal derived from the route model's demand prediction for the current hour.
pub const SIGNAL_PREDICTED_DEMAND: &str = "predicted_demand";
/// Signal derived from the route model's on-time share for the current hour.
pub const SIGNAL_RELIABILITY: &str = "reliability";

const HEALTH_BROADCAST_CAPACITY: usize = 64;

/// Fixed weights used by [`RealTimeManager::optimize_real_time`].
pub fn real_time_weights() -> Weights {
    HashMap::from([
        (SIGNAL_CURRENT_TRAFFIC.to_string(), 0.4),
        (SIGNAL_PREDICTED_DEMAND.to_string(), 0.3),
        (SIGNAL_RELIABILITY.to_string(), 0.3),
    ])
}

#[derive(Debug, Default)]
struct LiveState {
    traffic: HashMap<CellId, TrafficData>,
    models: HashMap<String, PredictiveModel>,
    route_cells: HashMap<String, HashSet<CellId>>,
    incidents: HashMap<String, Vec<Incident>>,
}

struct Shared {
    store: Arc<dyn RouteStore>,
    planner: Arc<RoutePlanner>,
    config: EngineConfig,
    live: RwLock<LiveState>,
    updates: mpsc::Sender<RouteUpdate>,
    health_tx: broadcast::Sender<HealthReport>,
}

struct MonitorHandle {
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    async fn stop(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "health monitor task ended abnormally");
        }
    }
}

/// Live traffic, predictive models, the update consumer, and health monitors.
pub struct RealTimeManager {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
}

impl RealTimeManager {
    /// Create the manager and spawn its update consumer on the current runtime.
    pub fn new(store: Arc<dyn RouteStore>, planner: Arc<RoutePlanner>, config: EngineConfig) -> Self {
        let (updates, rx) = mpsc::channel(config.update_queue_capacity.max(1));
        let (health_tx, _) = broadcast::channel(HEALTH_BROADCAST_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            store,
            planner,
            config,
            live: RwLock::new(LiveState::default()),
            updates,
            health_tx,
        });
        let consumer = tokio::spawn(run_consumer(shared.clone(), rx, shutdown_rx));
        info!(
            capacity = shared.config.update_queue_capacity,
            "real-time update consumer started"
        );

        Self {
            shared,
            shutdown_tx,
            consumer: Mutex::new(Some(consumer)),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    pub fn planner(&self) -> &Arc<RoutePlanner> {
        &self.shared.planner
    }

    /// Enqueue without waiting; rejects with [`Error::QueueFull`] at capacity.
    pub fn submit(&self, update: RouteUpdate) -> Result<()> {
        self.shared.enqueue(update)
    }

    /// Enqueue, waiting at most `timeout` for queue space.
    pub async fn submit_timeout(&self, update: RouteUpdate, timeout: Duration) -> Result<()> {
        let kind = update.kind.name();
        match self.shared.updates.send_timeout(update, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                metrics::counter!("routr_updates_rejected_total", "reason" => "timeout", "kind" => kind)
                    .increment(1);
                Err(Error::Timeout {
                    operation: "submit_update".to_string(),
                    after: timeout,
                })
            }
            Err(SendTimeoutError::Closed(_)) => Err(Error::QueueClosed),
        }
    }

    /// Enqueue a sensor traffic observation for `cell`.
    pub fn update_traffic(&self, cell: CellId, speed_kmh: f64, congestion: f64) -> Result<()> {
        self.submit(RouteUpdate::traffic(TrafficData::new(cell, speed_kmh, congestion)))
    }

    /// Apply one update immediately, bypassing the queue.
    pub async fn apply(&self, update: RouteUpdate) -> Result<()> {
        self.shared.dispatch(update).await
    }

    /// Predictions for every hour of the day, retraining when the model is stale or missing.
    pub async fn predict_demand(&self, route_id: &str) -> Result<BTreeMap<u32, Prediction>> {
        let cached = {
            let live = self.shared.live.read().await;
            live.models
                .get(route_id)
                .filter(|m| m.is_fresh(self.shared.config.model_max_age, Utc::now()))
                .map(|m| m.predictions.clone())
        };
        match cached {
            Some(predictions) => Ok(predictions),
            None => Ok(self.shared.retrain(route_id).await?.predictions),
        }
    }

    /// Retrain the model for `route_id` from its stored history.
    pub async fn retrain(&self, route_id: &str) -> Result<PredictiveModel> {
        self.shared.retrain(route_id).await
    }

    /// Register the cells whose traffic counts towards `route_id`'s health.
    pub async fn track_route<I>(&self, route_id: &str, cells: I)
    where
        I: IntoIterator<Item = CellId>,
    {
        let cells: HashSet<CellId> = cells.into_iter().collect();
        debug!(route_id, cells = cells.len(), "route cells tracked");
        self.shared
            .live
            .write()
            .await
            .route_cells
            .insert(route_id.to_string(), cells);
    }

    /// Health of `route_id` from the current live state, without side effects.
    pub async fn health_snapshot(&self, route_id: &str) -> HealthReport {
        self.shared.health_snapshot(route_id).await
    }

    /// One monitoring tick: evaluate, re-optimize when unhealthy, emit issues.
    pub async fn check_route_health(&self, route_id: &str) -> HealthReport {
        self.shared.check_route_health(route_id).await
    }

    /// Start (or restart) periodic health checks for `route_id`.
    ///
    /// The first check runs one interval after the call.
    pub async fn monitor_route_health(&self, route_id: &str) {
        let (cancel, mut cancelled) = watch::channel(false);
        let shared = self.shared.clone();
        let period = shared.config.health_check_interval;
        let route = route_id.to_string();

        let join = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => {
                        let report = shared.check_route_health(&route).await;
                        debug!(route_id = %route, score = report.score, "health tick");
                    }
                }
            }
            debug!(route_id = %route, "health monitor stopped");
        });

        info!(route_id, period_secs = period.as_secs(), "health monitor started");
        let previous = self
            .monitors
            .lock()
            .await
            .insert(route_id.to_string(), MonitorHandle { cancel, join });
        if let Some(previous) = previous {
            previous.stop().await;
        }
    }

    /// Cancel and join the monitor for `route_id`. Returns whether one was running.
    pub async fn stop_monitoring(&self, route_id: &str) -> bool {
        let handle = self.monitors.lock().await.remove(route_id);
        match handle {
            Some(handle) => {
                handle.stop().await;
                info!(route_id, "health monitor cancelled");
                true
            }
            None => false,
        }
    }

    /// Ids of routes with a running monitor, sorted.
    pub async fn monitored_routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.monitors.lock().await.keys().cloned().collect();
        routes.sort();
        routes
    }

    /// Re-rank a set using live traffic and fresh model predictions.
    pub async fn optimize_real_time(&self, set_id: &str) -> Result<RouteSet> {
        self.shared.optimize_real_time(set_id).await
    }

    pub async fn traffic(&self, cell: CellId) -> Option<TrafficData> {
        self.shared.live.read().await.traffic.get(&cell).cloned()
    }

    pub async fn traffic_snapshot(&self) -> HashMap<CellId, TrafficData> {
        self.shared.live.read().await.traffic.clone()
    }

    pub async fn model(&self, route_id: &str) -> Option<PredictiveModel> {
        self.shared.live.read().await.models.get(route_id).cloned()
    }

    pub async fn incidents(&self, route_id: &str) -> Vec<Incident> {
        self.shared
            .live
            .read()
            .await
            .incidents
            .get(route_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscribe_health(&self) -> broadcast::Receiver<HealthReport> {
        self.shared.health_tx.subscribe()
    }

    /// Stop every monitor, close the queue, process what is left, and join the consumer.
    pub async fn shutdown(&self) {
        let monitors: Vec<MonitorHandle> = self.monitors.lock().await.drain().map(|(_, h)| h).collect();
        for handle in monitors {
            handle.stop().await;
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(consumer) = self.consumer.lock().await.take() {
            if let Err(e) = consumer.await {
                warn!(error = %e, "update consumer ended abnormally");
            }
            info!("real-time manager shut down");
        }
    }
}

impl Drop for RealTimeManager {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for (_, handle) in self.monitors.get_mut().drain() {
            let _ = handle.cancel.send(true);
        }
    }
}

impl std::fmt::Debug for RealTimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTimeManager")
            .field("config", &self.shared.config)
            .finish()
    }
}

async fn run_consumer(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<RouteUpdate>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some(update) => {
                    let _ = shared.dispatch(update).await;
                }
                None => break,
            },
            _ = shutdown.changed() => {
                rx.close();
                let mut drained = 0usize;
                while let Some(update) = rx.recv().await {
                    let _ = shared.dispatch(update).await;
                    drained += 1;
                }
                debug!(drained, "update queue drained");
                break;
            }
        }
    }
}

impl Shared {
    fn enqueue(&self, update: RouteUpdate) -> Result<()> {
        let kind = update.kind.name();
        self.updates.try_send(update).map_err(|e| match e {
            TrySendError::Full(update) => {
                metrics::counter!("routr_updates_rejected_total", "reason" => "full", "kind" => kind)
                    .increment(1);
                warn!(kind, route_id = %update.route_id, "update queue full, update rejected");
                Error::QueueFull {
                    capacity: self.config.update_queue_capacity,
                    route_id: update.route_id,
                }
            }
            TrySendError::Closed(_) => Error::QueueClosed,
        })
    }

    /// Handle one update, recording the outcome. Failures are logged and returned.
    async fn dispatch(&self, update: RouteUpdate) -> Result<()> {
        let kind = update.kind.name();
        let outcome = match update.kind {
            UpdateKind::Traffic(data) => self.record_traffic(data).await,
            UpdateKind::Demand(record) => self.record_demand(record).await,
            UpdateKind::Incident(incident) => self.record_incident(&update.route_id, incident).await,
            UpdateKind::HealthIssue(report) => {
                warn!(
                    route_id = %report.route_id,
                    score = report.score,
                    issues = ?report.issues,
                    "route health issue"
                );
                let _ = self.health_tx.send(report);
                Ok(())
            }
        };

        match &outcome {
            Ok(()) => {
                metrics::counter!("routr_updates_processed_total", "kind" => kind, "outcome" => "ok")
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!("routr_updates_processed_total", "kind" => kind, "outcome" => "error")
                    .increment(1);
                warn!(kind, route_id = %update.route_id, error = %e, "update processing failed");
            }
        }
        outcome
    }

    async fn record_traffic(&self, data: TrafficData) -> Result<()> {
        let data = data.sanitized()?;
        debug!(cell = %data.cell, congestion = data.congestion, "traffic updated");
        self.live.write().await.traffic.insert(data.cell, data);
        Ok(())
    }

    async fn record_demand(&self, record: HistoricalRecord) -> Result<()> {
        let payload = observation_payload(&record)?;
        with_deadline(
            "persist_observation",
            self.config.store_timeout,
            self.store.mutate(&payload, true),
        )
        .await?;
        self.retrain(&record.route_id).await?;
        Ok(())
    }

    async fn record_incident(&self, route_id: &str, incident: Incident) -> Result<()> {
        let severity = incident.severity;
        info!(route_id, kind = %incident.kind, ?severity, "incident recorded");
        self.live
            .write()
            .await
            .incidents
            .entry(route_id.to_string())
            .or_default()
            .push(incident);

        if severity < Severity::High {
            return Ok(());
        }
        let mut failures = Vec::new();
        for set_id in self.planner.sets_containing(route_id).await {
            if let Err(e) = self.optimize_real_time(&set_id).await {
                warn!(route_id, set_id = %set_id, error = %e, "incident re-optimization failed");
                failures.push(format!("{}: {}", set_id, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Reoptimization {
                route_id: route_id.to_string(),
                failures,
            })
        }
    }

    async fn retrain(&self, route_id: &str) -> Result<PredictiveModel> {
        let history = fetch_history(self.store.as_ref(), route_id, self.config.store_timeout).await?;
        let model = PredictiveModel::train(route_id, &history);
        info!(
            route_id,
            samples = model.samples,
            accuracy = model.accuracy,
            "predictive model trained"
        );
        self.live
            .write()
            .await
            .models
            .insert(route_id.to_string(), model.clone());
        Ok(model)
    }

    async fn health_snapshot(&self, route_id: &str) -> HealthReport {
        let live = self.live.read().await;
        let congestion: Vec<(CellId, f64)> = match live.route_cells.get(route_id) {
            Some(cells) => cells
                .iter()
                .filter_map(|cell| live.traffic.get(cell).map(|t| (*cell, t.congestion)))
                .collect(),
            None => live
                .traffic
                .values()
                .map(|t| (t.cell, t.congestion))
                .collect(),
        };
        let accuracy = live.models.get(route_id).map(|m| m.accuracy);
        evaluate(route_id, congestion, accuracy)
    }

    async fn check_route_health(&self, route_id: &str) -> HealthReport {
        let mut report = self.health_snapshot(route_id).await;
        metrics::gauge!("routr_health_score", "route_id" => route_id.to_string()).set(report.score);

        if report.needs_reoptimization() {
            warn!(route_id, score = report.score, "route unhealthy, re-optimizing its sets");
            for set_id in self.planner.sets_containing(route_id).await {
                if let Err(e) = self.optimize_real_time(&set_id).await {
                    warn!(route_id, set_id = %set_id, error = %e, "re-optimization failed");
                    report
                        .issues
                        .push(format!("Re-optimization of route set {} failed: {}", set_id, e));
                }
            }
        }

        if !report.is_healthy() {
            if let Err(e) = self.enqueue(RouteUpdate::health_issue(report.clone())) {
                warn!(route_id, error = %e, "health issue could not be queued");
            }
        }
        report
    }

    async fn optimize_real_time(&self, set_id: &str) -> Result<RouteSet> {
        let member_cells = self.planner.member_cells(set_id).await?;
        let now = Utc::now();

        let signals: HashMap<String, RouteMetrics> = {
            let live = self.live.read().await;
            member_cells
                .iter()
                .map(|(route_id, cells)| {
                    let mut values = RouteMetrics::new();

                    let flows: Vec<f64> = cells
                        .iter()
                        .filter_map(|cell| live.traffic.get(cell))
                        .map(|t| 1.0 - t.congestion)
                        .collect();
                    if !flows.is_empty() {
                        values.insert(
                            SIGNAL_CURRENT_TRAFFIC.to_string(),
                            flows.iter().sum::<f64>() / flows.len() as f64,
                        );
                    }

                    let prediction = live
                        .models
                        .get(route_id)
                        .filter(|m| m.is_fresh(self.config.model_max_age, now))
                        .and_then(|m| m.predict_at(now));
                    if let Some(prediction) = prediction {
                        values.insert(SIGNAL_PREDICTED_DEMAND.to_string(), prediction.demand);
                        values.insert(SIGNAL_RELIABILITY.to_string(), prediction.reliability);
                    }

                    (route_id.clone(), values)
                })
                .filter(|(_, values)| !values.is_empty())
                .collect()
        };

        debug!(set_id, signals = signals.len(), "real-time optimization");
        self.planner
            .optimize_route_set_with_signals(set_id, &real_time_weights(), &signals)
            .await
    }
}
