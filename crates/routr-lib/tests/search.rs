mod common;

use std::time::Duration;

use chrono::NaiveTime;
use routr_lib::{Error, RouteSearch, SearchCriteria};

use common::{route, seeded_store, NAIROBI_CBD, NGONG_ROAD, THIKA, WESTLANDS};

#[tokio::test]
async fn near_location_matches_pickups_in_the_one_ring() {
    let (store, ids) = seeded_store(vec![
        route("46", NAIROBI_CBD, NGONG_ROAD),
        route("237", THIKA, NAIROBI_CBD),
    ])
    .await;
    let search = RouteSearch::new(store);

    let found = search
        .search_routes(&SearchCriteria::default().near(NAIROBI_CBD.0, NAIROBI_CBD.1))
        .await
        .expect("search succeeds");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ids[0]);
}

#[tokio::test]
async fn destination_and_day_terms_are_case_insensitive() {
    let mut weekend = route("111", WESTLANDS, NGONG_ROAD);
    weekend.active_days = vec!["Saturday".to_string()];
    weekend.destinations = vec!["Westlands".to_string()];
    let (store, _) = seeded_store(vec![route("46", NAIROBI_CBD, NGONG_ROAD), weekend]).await;
    let search = RouteSearch::new(store);

    let found = search
        .search_routes(&SearchCriteria::default().to_destination("KAREN").on_day("monday"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].route_number, "46");

    let none = search
        .search_routes(&SearchCriteria::default().to_destination("karen").on_day("saturday"))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn all_criteria_combined() {
    let mut dear = route("33", NAIROBI_CBD, NGONG_ROAD);
    dear.fare.regular = 200.0;
    let (store, _) = seeded_store(vec![route("46", NAIROBI_CBD, NGONG_ROAD), dear]).await;
    let search = RouteSearch::new(store);

    let criteria = SearchCriteria::default()
        .near(NAIROBI_CBD.0, NAIROBI_CBD.1)
        .within(500.0)
        .to_destination("Ngong")
        .on_day("Tuesday")
        .max_fare(100.0)
        .at(NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    let found = search.search_routes(&criteria).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].route_number, "46");
}

#[tokio::test]
async fn no_match_is_an_empty_success() {
    let (store, _) = seeded_store(vec![route("46", NAIROBI_CBD, NGONG_ROAD)]).await;
    let found = RouteSearch::new(store)
        .search_routes(&SearchCriteria::default().near(THIKA.0, THIKA.1))
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn invalid_criteria_never_reach_the_store() {
    let (store, _) = seeded_store(Vec::new()).await;
    let search = RouteSearch::new(store.clone());

    let err = search
        .search_routes(&SearchCriteria::default().near(123.0, 36.8))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let err = search
        .search_routes(&SearchCriteria::default().max_fare(-1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn store_failure_propagates() {
    let (store, _) = seeded_store(vec![route("46", NAIROBI_CBD, NGONG_ROAD)]).await;
    store.fail_queries(Some("connection refused")).await;

    let err = RouteSearch::new(store)
        .search_routes(&SearchCriteria::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    assert!(err.is_store_error());
}

#[tokio::test]
async fn malformed_response_is_decode_error() {
    let (store, _) = seeded_store(Vec::new()).await;
    store.respond_with(Some("{\"routes\": [{\"uid\": 5}]}")).await;

    let err = RouteSearch::new(store)
        .search_routes(&SearchCriteria::default())
        .await
        .unwrap_err();
    match err {
        Error::Decode { operation, .. } => assert_eq!(operation, "SearchRoutes"),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out() {
    let (store, _) = seeded_store(vec![route("46", NAIROBI_CBD, NGONG_ROAD)]).await;
    store.set_latency(Some(Duration::from_secs(30))).await;

    let err = RouteSearch::new(store)
        .with_timeout(Some(Duration::from_secs(2)))
        .search_routes(&SearchCriteria::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
}
