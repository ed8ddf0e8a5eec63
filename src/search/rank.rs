//! Ranking engine: full scan of a record index, thresholded and truncated.
//!
//! Ordering is total and independent of scan scheduling: score descending,
//! then original index position ascending. Both the sequential scan and the
//! rayon scan keep bounded top-`limit` heaps under that same order, so they
//! always return identical lists.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

use rayon::prelude::*;

use super::align::align_tokens;
use crate::index::RecordIndex;
use crate::model::types::{EntityRecord, NameToken};
use crate::search::normalize::tokenize;

/// Minimum record count before the scan is split across rayon.
/// Below this, task overhead outweighs the parallel speedup.
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Records per rayon task, and the cancellation polling interval.
const CHUNK_SIZE: usize = 512;

/// Set WSCREEN_PARALLEL_RANK=0 to force sequential scans.
static PARALLEL_RANK_ENABLED: once_cell::sync::Lazy<bool> = once_cell::sync::Lazy::new(|| {
    dotenvy::var("WSCREEN_PARALLEL_RANK")
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(true)
});

/// A validated screening query.
#[derive(Debug, Clone)]
pub struct Query {
    name: String,
    tokens: Vec<NameToken>,
    min_match: f64,
    limit: usize,
}

impl Query {
    /// Build a query from already-validated parts.
    ///
    /// Returns `None` when the name has no tokens, `min_match` is outside
    /// `[0, 1]`, or `limit` is zero.
    pub fn new(name: impl Into<String>, min_match: f64, limit: usize) -> Option<Self> {
        let name = name.into();
        let tokens = tokenize(&name);
        if tokens.is_empty() || !(0.0..=1.0).contains(&min_match) || limit == 0 {
            return None;
        }
        Some(Self {
            name,
            tokens,
            min_match,
            limit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tokens(&self) -> &[NameToken] {
        &self.tokens
    }

    pub fn min_match(&self) -> f64 {
        self.min_match
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A record that cleared the threshold. Borrowed from the index snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    pub record: &'a EntityRecord,
    pub score: f64,
    /// Position of the record in the index it was ranked from.
    pub position: usize,
}

/// Cooperative cancellation shared between a caller and a running scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also trips once `deadline` passes.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, AtomicOrdering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(AtomicOrdering::Relaxed) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// The scan stopped before completing; no results are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ranking cancelled")]
pub struct Cancelled;

/// Rank every record in `index` against `query`.
pub fn rank<'a>(index: &'a RecordIndex, query: &Query) -> Vec<MatchResult<'a>> {
    // A fresh token has no deadline and nobody else holds it.
    rank_cancellable(index, query, &CancelToken::new()).unwrap_or_default()
}

/// Rank with cancellation polled between chunks of records.
pub fn rank_cancellable<'a>(
    index: &'a RecordIndex,
    query: &Query,
    cancel: &CancelToken,
) -> Result<Vec<MatchResult<'a>>, Cancelled> {
    let records = index.records();
    let heap = if *PARALLEL_RANK_ENABLED && records.len() >= PARALLEL_THRESHOLD {
        rank_parallel(records, query, cancel)?
    } else {
        rank_sequential(records, query, cancel)?
    };
    Ok(into_sorted(heap, records))
}

#[derive(Debug, Clone, Copy)]
struct Ranked {
    score: f64,
    position: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    /// Greater means better: higher score, then earlier position.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.position.cmp(&self.position))
    }
}

type TopHeap = BinaryHeap<Reverse<Ranked>>;

fn push_bounded(heap: &mut TopHeap, entry: Ranked, limit: usize) {
    if heap.len() < limit {
        heap.push(Reverse(entry));
    } else if heap.peek().is_some_and(|worst| entry > worst.0) {
        heap.pop();
        heap.push(Reverse(entry));
    }
}

fn scan_chunk(records: &[EntityRecord], offset: usize, query: &Query, heap: &mut TopHeap) {
    for (i, record) in records.iter().enumerate() {
        let score = align_tokens(query.tokens(), record.tokens());
        if score >= query.min_match() {
            push_bounded(
                heap,
                Ranked {
                    score,
                    position: offset + i,
                },
                query.limit(),
            );
        }
    }
}

fn rank_sequential(
    records: &[EntityRecord],
    query: &Query,
    cancel: &CancelToken,
) -> Result<TopHeap, Cancelled> {
    let mut heap = BinaryHeap::with_capacity(query.limit().min(records.len()) + 1);
    for (chunk_idx, chunk) in records.chunks(CHUNK_SIZE).enumerate() {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        scan_chunk(chunk, chunk_idx * CHUNK_SIZE, query, &mut heap);
    }
    Ok(heap)
}

fn rank_parallel(
    records: &[EntityRecord],
    query: &Query,
    cancel: &CancelToken,
) -> Result<TopHeap, Cancelled> {
    // Thread-local heaps avoid contention; merged afterwards under the same order.
    let partials: Result<Vec<TopHeap>, Cancelled> = records
        .par_chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(chunk_idx, chunk)| {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            let mut local = BinaryHeap::with_capacity(query.limit().min(chunk.len()) + 1);
            scan_chunk(chunk, chunk_idx * CHUNK_SIZE, query, &mut local);
            Ok(local)
        })
        .collect();

    let mut merged = BinaryHeap::with_capacity(query.limit().min(records.len()) + 1);
    for local in partials? {
        for Reverse(entry) in local {
            push_bounded(&mut merged, entry, query.limit());
        }
    }
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    Ok(merged)
}

fn into_sorted(heap: TopHeap, records: &[EntityRecord]) -> Vec<MatchResult<'_>> {
    let mut ranked: Vec<Ranked> = heap.into_iter().map(|r| r.0).collect();
    ranked.sort_unstable_by(|a, b| b.cmp(a));
    ranked
        .into_iter()
        .map(|r| MatchResult {
            record: &records[r.position],
            score: r.score,
            position: r.position,
        })
        .collect()
}
