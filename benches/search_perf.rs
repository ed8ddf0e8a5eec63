use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use watchlist_screen::config::ServiceConfig;
use watchlist_screen::index::{IndexHandle, RecordIndex};
use watchlist_screen::loadgen::{NameGenerator, SyntheticNames};
use watchlist_screen::search::normalize::tokenize;
use watchlist_screen::search::{Query, align_tokens, rank, similarity};
use watchlist_screen::service::{RawQuery, SearchService};

fn synthetic_index(count: usize) -> RecordIndex {
    let records = SyntheticNames::seeded(42).records(count);
    RecordIndex::new(records).unwrap_or_else(|e| panic!("synthetic index: {e}"))
}

// =============================================================================
// Scorer Benchmarks
// =============================================================================

fn bench_jaro_winkler(c: &mut Criterion) {
    c.bench_function("jaro_winkler_short_pair", |b| {
        b.iter(|| black_box(similarity(black_box("martha"), black_box("marhta"))))
    });

    c.bench_function("jaro_winkler_long_pair", |b| {
        b.iter(|| {
            black_box(similarity(
                black_box("abdulrahmanalrashidibnkhalid"),
                black_box("abdelrahmanelrasheedbinkhaled"),
            ))
        })
    });
}

fn bench_align(c: &mut Criterion) {
    let query = tokenize("Mohammed Ali Hassan");
    let candidate = tokenize("HASSAN, Muhammad Ali al-Rashid");

    c.bench_function("align_three_by_four_tokens", |b| {
        b.iter(|| black_box(align_tokens(black_box(&query), black_box(&candidate))))
    });
}

// =============================================================================
// Ranking Benchmarks
// =============================================================================

fn bench_rank_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_full_scan");
    group.sample_size(20);

    for size in [1_000usize, 10_000, 50_000] {
        let index = synthetic_index(size);
        let query = Query::new("Maria Garcia", 0.70, 10).unwrap_or_else(|| panic!("valid query"));
        group.bench_with_input(BenchmarkId::from_parameter(size), &index, |b, index| {
            b.iter(|| black_box(rank(index, &query)))
        });
    }

    group.finish();
}

/// Ten workers screening generated names against one shared index, the way a
/// batch integration drives the service.
fn bench_concurrent_search(c: &mut Criterion) {
    let handle = Arc::new(IndexHandle::with_index(synthetic_index(10_000)));
    let service = Arc::new(SearchService::new(ServiceConfig::default(), handle));
    let mut names = SyntheticNames::seeded(7);
    let queries: Vec<RawQuery> = (0..10)
        .map(|_| RawQuery::new(names.next_name()).with_limit(10).with_min_match("0.70"))
        .collect();

    let mut group = c.benchmark_group("concurrent_search");
    group.sample_size(10);
    group.bench_function("10_workers_10k_records", |b| {
        b.iter(|| {
            std::thread::scope(|scope| {
                for query in &queries {
                    let service = Arc::clone(&service);
                    scope.spawn(move || black_box(service.search(query).ok()));
                }
            });
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_jaro_winkler,
    bench_align,
    bench_rank_scaling,
    bench_concurrent_search,
);
criterion_main!(benches);
