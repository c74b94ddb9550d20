mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use routr_lib::{
    Error, LinearScoring, RouteAnalytics, RouteCache, RouteMetrics, RoutePlanner, RouteSearch,
    ScoringStrategy, SearchCriteria, Weights,
};

use common::{planner, route, seeded_store, NAIROBI_CBD, NGONG_ROAD, THIKA, WESTLANDS};

fn weights(pairs: &[(&str, f64)]) -> Weights {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn analytics(route_id: &str, usage: u64, delay: f64, reliability: f64, peaks: &[u32]) -> RouteAnalytics {
    RouteAnalytics {
        route_id: route_id.to_string(),
        usage_count: usage,
        average_delay: delay,
        peak_hours: peaks.to_vec(),
        reliability,
        last_analyzed: Utc::now(),
    }
}

async fn three_route_fixture() -> (Arc<RoutePlanner>, Vec<String>) {
    let (store, ids) = seeded_store(vec![
        route("46", NAIROBI_CBD, NGONG_ROAD),
        route("111", WESTLANDS, NGONG_ROAD),
        route("237", THIKA, NAIROBI_CBD),
    ])
    .await;
    (planner(store), ids)
}

#[tokio::test]
async fn create_route_set_collects_members_and_coverage() {
    let (planner, ids) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();

    assert_eq!(set.routes, ids);
    assert_eq!(set.name, "all");
    assert_eq!(set.created_at, set.updated_at);
    assert!(set.properties.contains_key("criteria"));

    let member_cells = planner.member_cells(&set.id).await.unwrap();
    let union: std::collections::HashSet<_> = member_cells.values().flatten().copied().collect();
    assert_eq!(union, set.coverage);
    assert_eq!(planner.route_set(&set.id).await, Some(set));
}

#[tokio::test]
async fn failed_search_stores_nothing() {
    let (store, _) = seeded_store(vec![route("46", NAIROBI_CBD, NGONG_ROAD)]).await;
    store.fail_queries(Some("unavailable")).await;
    let planner = planner(store);

    let err = planner
        .create_route_set("x", &SearchCriteria::default())
        .await
        .unwrap_err();
    assert!(err.is_store_error());
    assert!(planner.route_sets().await.is_empty());
    assert!(planner.cache().is_empty().await);
}

#[tokio::test]
async fn stale_cache_entries_are_refetched() {
    let (store, _) = seeded_store(vec![route("46", NAIROBI_CBD, NGONG_ROAD)]).await;
    let planner = RoutePlanner::new(
        RouteSearch::new(store.clone()),
        Arc::new(RouteCache::new(Duration::ZERO)),
    );
    let criteria = SearchCriteria::default();

    planner.create_route_set("a", &criteria).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    planner.create_route_set("b", &criteria).await.unwrap();

    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn optimize_unknown_set_is_not_found_and_changes_nothing() {
    let (planner, _) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();

    let err = planner
        .optimize_route_set("missing", &weights(&[("reliability", 1.0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(planner.route_sets().await, vec![set]);
}

#[tokio::test]
async fn optimize_rejects_malformed_weights() {
    let (planner, _) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();

    let err = planner
        .optimize_route_set(&set.id, &weights(&[("reliability", -0.5)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(planner.route_set(&set.id).await.unwrap(), set);
}

#[tokio::test]
async fn optimize_orders_by_weighted_analytics() {
    let (planner, ids) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();

    planner.record_analytics(analytics(&ids[0], 100, 5.0, 0.6, &[])).await.unwrap();
    planner.record_analytics(analytics(&ids[1], 50, 1.0, 0.95, &[])).await.unwrap();
    // ids[2] has no analytics and is kept, last

    let optimized = planner
        .optimize_route_set(&set.id, &weights(&[("reliability", 0.7), ("punctuality", 0.3)]))
        .await
        .unwrap();

    assert_eq!(optimized.routes, vec![ids[1].clone(), ids[0].clone(), ids[2].clone()]);
    assert_eq!(optimized.coverage, set.coverage);
    assert!(optimized.updated_at >= set.updated_at);
    assert_eq!(optimized.properties["strategy"], "linear");
}

#[tokio::test]
async fn signals_override_analytics() {
    let (planner, ids) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();
    planner.record_analytics(analytics(&ids[0], 0, 0.0, 0.9, &[])).await.unwrap();
    planner.record_analytics(analytics(&ids[1], 0, 0.0, 0.1, &[])).await.unwrap();

    let signals: HashMap<String, RouteMetrics> = HashMap::from([
        (ids[0].clone(), HashMap::from([("reliability".to_string(), 0.0)])),
        (ids[2].clone(), HashMap::from([("reliability".to_string(), 1.0)])),
    ]);
    let optimized = planner
        .optimize_route_set_with_signals(&set.id, &weights(&[("reliability", 1.0)]), &signals)
        .await
        .unwrap();

    assert_eq!(optimized.routes, vec![ids[2].clone(), ids[1].clone(), ids[0].clone()]);
}

struct Picky;

impl ScoringStrategy for Picky {
    fn name(&self) -> &'static str {
        "picky"
    }

    fn rank(
        &self,
        candidates: &[String],
        _metrics: &HashMap<String, RouteMetrics>,
        _weights: &Weights,
    ) -> Vec<String> {
        // last member only, plus an id that is not in the set
        let mut picked = vec!["0xdeadbeef".to_string()];
        picked.extend(candidates.last().cloned());
        picked
    }
}

#[tokio::test]
async fn strategy_selection_shrinks_set_and_foreign_ids_are_dropped() {
    let (store, ids) = seeded_store(vec![
        route("46", NAIROBI_CBD, NGONG_ROAD),
        route("237", THIKA, NAIROBI_CBD),
    ])
    .await;
    let planner = RoutePlanner::with_strategy(
        RouteSearch::new(store),
        Arc::new(RouteCache::new(Duration::from_secs(60))),
        Box::new(Picky),
    );
    let set = planner
        .create_route_set("two", &SearchCriteria::default())
        .await
        .unwrap();
    let cells = planner.member_cells(&set.id).await.unwrap();

    let optimized = planner
        .optimize_route_set(&set.id, &weights(&[("usage", 1.0)]))
        .await
        .unwrap();

    assert_eq!(optimized.routes, vec![ids[1].clone()]);
    assert_eq!(optimized.coverage, cells[&ids[1]]);
    assert!(optimized.coverage.len() < set.coverage.len());
    assert_eq!(planner.member_cells(&set.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn keep_n_strategy_truncates() {
    let (store, _) = seeded_store(vec![
        route("46", NAIROBI_CBD, NGONG_ROAD),
        route("111", WESTLANDS, NGONG_ROAD),
        route("237", THIKA, NAIROBI_CBD),
    ])
    .await;
    let planner = RoutePlanner::with_strategy(
        RouteSearch::new(store),
        Arc::new(RouteCache::new(Duration::from_secs(60))),
        Box::new(LinearScoring::keep(2)),
    );
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();
    let optimized = planner
        .optimize_route_set(&set.id, &weights(&[("usage", 1.0)]))
        .await
        .unwrap();
    assert_eq!(optimized.routes.len(), 2);
}

#[tokio::test]
async fn analyze_reports_coverage_reliability_and_peaks() {
    let (planner, ids) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();
    planner.record_analytics(analytics(&ids[0], 100, 4.0, 0.8, &[7, 8, 17])).await.unwrap();
    planner.record_analytics(analytics(&ids[1], 300, 2.0, 0.6, &[8, 18])).await.unwrap();

    let analysis = planner.analyze_route_set(&set.id).await.unwrap();

    assert_eq!(analysis.set_id, set.id);
    assert_eq!(analysis.route_count, 3);
    assert!((analysis.coverage_area - set.coverage.len() as f64 * 0.1).abs() < 1e-9);
    assert!((analysis.reliability_score - 0.7).abs() < 1e-9);
    assert_eq!(analysis.average_metrics["usage_count"], 200.0);
    assert_eq!(analysis.average_metrics["average_delay"], 3.0);
    // three members: an hour needs at least one peaking member
    assert_eq!(analysis.peak_hours, vec![7, 8, 17, 18]);
}

#[tokio::test]
async fn analyze_without_analytics_is_zeroed() {
    let (planner, _) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();

    let analysis = planner.analyze_route_set(&set.id).await.unwrap();
    assert_eq!(analysis.reliability_score, 0.0);
    assert!(analysis.average_metrics.is_empty());
    assert!(analysis.peak_hours.is_empty());
}

#[tokio::test]
async fn analyze_is_repeatable() {
    let (planner, ids) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();
    planner.record_analytics(analytics(&ids[0], 10, 1.0, 0.5, &[8])).await.unwrap();

    let mut first = planner.analyze_route_set(&set.id).await.unwrap();
    let second = planner.analyze_route_set(&set.id).await.unwrap();
    first.analyzed_at = second.analyzed_at;
    assert_eq!(first, second);

    assert!(matches!(
        planner.analyze_route_set("nope").await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn membership_queries() {
    let (planner, ids) = three_route_fixture().await;
    let all = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();
    let near = planner
        .create_route_set("cbd", &SearchCriteria::default().near(NAIROBI_CBD.0, NAIROBI_CBD.1))
        .await
        .unwrap();

    assert_eq!(near.routes, vec![ids[0].clone()]);
    let mut both = vec![all.id.clone(), near.id.clone()];
    both.sort();
    assert_eq!(planner.sets_containing(&ids[0]).await, both);
    assert_eq!(planner.sets_containing(&ids[2]).await, vec![all.id.clone()]);

    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(planner.route_ids().await, sorted);

    planner.remove_route_set(&all.id).await.unwrap();
    assert_eq!(planner.route_ids().await, vec![ids[0].clone()]);
    assert!(matches!(
        planner.remove_route_set(&all.id).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_never_see_partial_sets() {
    let (planner, ids) = three_route_fixture().await;
    let set = planner
        .create_route_set("all", &SearchCriteria::default())
        .await
        .unwrap();
    for (i, id) in ids.iter().enumerate() {
        planner
            .record_analytics(analytics(id, i as u64 * 10, 0.0, 0.5, &[]))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..20 {
        let planner = planner.clone();
        let set_id = set.id.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let w = if i % 4 == 0 { "usage" } else { "reliability" };
                planner
                    .optimize_route_set(&set_id, &weights(&[(w, 1.0)]))
                    .await
                    .map(|s| s.routes.len())
            } else {
                planner.analyze_route_set(&set_id).await.map(|a| a.route_count)
            }
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 3);
    }
}
