mod util;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serial_test::serial;
use util::{EnvGuard, TestTracing, index_of, seeded_records};
use watchlist_screen::config::ServiceConfig;
use watchlist_screen::index::{IndexHandle, RecordIndex};
use watchlist_screen::service::{ErrorKind, RawQuery, SearchError, SearchService};

fn service_over(index: RecordIndex) -> SearchService {
    SearchService::new(
        ServiceConfig::default(),
        Arc::new(IndexHandle::with_index(index)),
    )
}

#[test]
fn exact_name_scores_one() {
    let svc = service_over(index_of(&[("sdn-1", "John Smith")]));
    let resp = svc
        .search(&RawQuery::new("John Smith").with_min_match("0.99").with_limit(10))
        .unwrap();
    assert_eq!(resp.hits.len(), 1);
    assert_eq!(resp.hits[0].id, "sdn-1");
    assert!((resp.hits[0].score - 1.0).abs() < 1e-9);
}

#[test]
fn unrelated_name_returns_no_hits() {
    let svc = service_over(index_of(&[("sdn-1", "John Smith"), ("sdn-2", "Maria Garcia")]));
    let resp = svc
        .search(&RawQuery::new("Qwx Zvbk").with_min_match("0.7"))
        .unwrap();
    assert!(resp.hits.is_empty(), "{:?}", resp.hits);
    assert_eq!(resp.records_scanned, 2);
}

#[test]
fn limit_one_keeps_only_the_best() {
    let svc = service_over(index_of(&[("weaker", "Jon Smith"), ("stronger", "John Smith")]));
    let all = svc
        .search(&RawQuery::new("John Smith").with_min_match("0.8"))
        .unwrap();
    assert_eq!(all.hits.len(), 2);
    assert!(all.hits[0].score > all.hits[1].score);

    let top = svc
        .search(&RawQuery::new("John Smith").with_min_match("0.8").with_limit(1))
        .unwrap();
    assert_eq!(top.hits.len(), 1);
    assert_eq!(top.hits[0].id, "stronger");
}

#[test]
fn out_of_range_min_match_is_a_client_error() {
    let svc = service_over(index_of(&[("sdn-1", "John Smith")]));
    let err = svc
        .search(&RawQuery::new("John Smith").with_min_match("1.5"))
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidMinMatch(_)));
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(err.status_code(), 400);

    let stats = svc.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.completed, 0);
}

#[test]
fn token_order_does_not_change_the_score() {
    let svc = service_over(index_of(&[("sdn-1", "John Smith")]));
    let forward = svc.search(&RawQuery::new("John Smith")).unwrap();
    let reversed = svc.search(&RawQuery::new("Smith John")).unwrap();
    assert_eq!(forward.hits[0].score, reversed.hits[0].score);
}

#[test]
fn query_string_parameters_flow_through() {
    let svc = service_over(index_of(&[("sdn-1", "John Smith"), ("sdn-2", "Johan Smit")]));
    let raw = RawQuery::from_query_string("name=John+Smith&limit=1&minMatch=0.50");
    let resp = svc.search(&raw).unwrap();
    assert_eq!(resp.limit, 1);
    assert_eq!(resp.min_match, 0.5);
    assert_eq!(resp.hits.len(), 1);
    assert_eq!(resp.hits[0].id, "sdn-1");
}

#[test]
fn missing_index_is_unavailable_and_logged() {
    let tracing = TestTracing::new();
    let _guard = tracing.install();

    let svc = SearchService::new(ServiceConfig::default(), Arc::new(IndexHandle::empty()));
    let err = svc.search(&RawQuery::new("John Smith")).unwrap_err();
    assert!(matches!(err, SearchError::IndexUnavailable));
    assert_eq!(err.status_code(), 503);
    assert!(err.is_retryable());
    tracing.assert_contains("before a watchlist index was installed");
}

#[test]
fn concurrent_queries_match_serial_results() {
    let svc = Arc::new(service_over(
        RecordIndex::new(seeded_records(11, 3_000)).unwrap(),
    ));
    let names = [
        "Viktor Bout",
        "Amal Zarate",
        "Rustam Karimov",
        "Ines Oduya",
        "Kofi Lindqvist",
        "Marek Barzani",
        "Leyla Horvath",
        "Tomas Quispe",
    ];
    let serial: Vec<_> = names
        .iter()
        .map(|n| svc.search(&RawQuery::new(*n).with_limit(25)).unwrap().hits)
        .collect();

    let parallel: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = names
            .iter()
            .map(|n| {
                let svc = Arc::clone(&svc);
                scope.spawn(move || svc.search(&RawQuery::new(*n).with_limit(25)).unwrap().hits)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(serial, parallel);
    assert_eq!(svc.stats().completed, (names.len() * 2) as u64);
    assert_eq!(svc.stats().in_flight, 0);
}

#[test]
fn reload_during_queries_never_mixes_snapshots() {
    let handle = Arc::new(IndexHandle::with_index(
        RecordIndex::new(seeded_records(1, 500)).unwrap(),
    ));
    let svc = Arc::new(SearchService::new(ServiceConfig::default(), Arc::clone(&handle)));

    std::thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let svc = Arc::clone(&svc);
                scope.spawn(move || {
                    for _ in 0..50 {
                        let resp = svc.search(&RawQuery::new("Viktor Bout")).unwrap();
                        match resp.index_epoch {
                            1 => assert_eq!(resp.records_scanned, 500),
                            2 => assert_eq!(resp.records_scanned, 800),
                            other => panic!("unexpected epoch {other}"),
                        }
                    }
                })
            })
            .collect();

        handle.replace(RecordIndex::new(seeded_records(2, 800)).unwrap());
        for reader in readers {
            reader.join().unwrap();
        }
    });

    assert_eq!(handle.epoch(), 2);
}

#[test]
fn saturated_service_reports_overload() {
    let config = ServiceConfig {
        max_concurrent: 1,
        slot_wait: Duration::from_millis(20),
        ..ServiceConfig::default()
    };
    let svc = Arc::new(SearchService::new(
        config,
        Arc::new(IndexHandle::with_index(
            RecordIndex::new(seeded_records(5, 100_000)).unwrap(),
        )),
    ));

    // One long scan holds the only slot while short-wait queries pile up.
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                scope.spawn(move || svc.search(&RawQuery::new("Rustam Karimov")))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().any(Result::is_ok));
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, SearchError::Overloaded(_)), "{err}");
        assert_eq!(err.status_code(), 503);
    }
}

#[tokio::test]
async fn async_search_matches_blocking_search() {
    let svc = Arc::new(service_over(index_of(&[
        ("sdn-1", "John Smith"),
        ("sdn-2", "Jon Smyth"),
    ])));
    let blocking = svc.search(&RawQuery::new("John Smith")).unwrap();
    let awaited = svc
        .search_async(RawQuery::new("John Smith"), Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(blocking.hits, awaited.hits);
}

fn large_service(max_concurrent: usize) -> Arc<SearchService> {
    let config = ServiceConfig {
        max_concurrent,
        ..ServiceConfig::default()
    };
    Arc::new(SearchService::new(
        config,
        Arc::new(IndexHandle::with_index(
            RecordIndex::new(seeded_records(11, 200_000)).unwrap(),
        )),
    ))
}

#[test]
fn scan_past_its_deadline_is_a_timeout() {
    let svc = large_service(2);
    let err = svc
        .search_with_timeout(&RawQuery::new("Rustam Karimov"), Some(Duration::from_millis(1)))
        .unwrap_err();

    assert!(matches!(err, SearchError::Timeout(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.status_code(), 504);
    let stats = svc.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn async_timeout_cancels_the_worker_and_frees_its_slot() {
    let svc = large_service(2);
    let err = svc
        .search_async(RawQuery::new("Rustam Karimov"), Some(Duration::from_millis(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Timeout(_)), "{err}");
    assert_eq!(err.status_code(), 504);

    // The blocking worker observes the cancelled token at its next chunk.
    let give_up = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = svc.stats();
        if stats.in_flight == 0 && stats.timed_out == 1 {
            break;
        }
        assert!(Instant::now() < give_up, "worker never released: {stats:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(svc.stats().completed, 0);

    // A query without a deadline still runs to completion afterwards.
    let sibling = Arc::clone(&svc);
    let resp = tokio::task::spawn_blocking(move || {
        sibling.search_with_timeout(&RawQuery::new("Rustam Karimov"), None)
    })
    .await
    .unwrap()
    .unwrap();
    assert!(!resp.hits.is_empty());
    assert_eq!(resp.records_scanned, 200_000);

    let stats = svc.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.timed_out, 1);
}

#[test]
#[serial]
fn environment_overrides_limit_defaults() {
    let _default = EnvGuard::set("WSCREEN_DEFAULT_LIMIT", "1");
    let _max = EnvGuard::set("WSCREEN_MAX_LIMIT", "2");
    let svc = SearchService::with_defaults(Arc::new(IndexHandle::with_index(index_of(&[
        ("sdn-1", "John Smith"),
        ("sdn-2", "Jon Smith"),
        ("sdn-3", "John Smyth"),
    ]))));
    assert_eq!(svc.config().default_limit, 1);
    assert_eq!(svc.config().max_limit, 2);

    let defaulted = svc
        .search(&RawQuery::new("John Smith").with_min_match("0.5"))
        .unwrap();
    assert_eq!(defaulted.limit, 1);
    assert_eq!(defaulted.hits.len(), 1);
    assert_eq!(defaulted.hits[0].id, "sdn-1");

    let clamped = svc
        .search(&RawQuery::new("John Smith").with_min_match("0.5").with_limit(50))
        .unwrap();
    assert_eq!(clamped.limit, 2);
    assert_eq!(clamped.hits.len(), 2);
}
