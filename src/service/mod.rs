//! Search service: the concurrent entry point for screening queries.
//!
//! A query moves through `received → validated → (rejected | executing) →
//! completed`. Validation happens before any scoring work. Execution waits for
//! a slot in the concurrency ceiling, snapshots the current index exactly
//! once, and either returns the full ranked list or fails; there are no
//! partial results and no internal retries.

pub mod limiter;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::index::IndexHandle;
use crate::search::normalize::tokenize;
use crate::search::rank::{CancelToken, Cancelled, Query, rank_cancellable};
use limiter::ConcurrencyLimiter;

/// Query parameters exactly as an external caller supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuery {
    pub name: Option<String>,
    pub limit: Option<String>,
    pub min_match: Option<String>,
}

impl RawQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: impl ToString) -> Self {
        self.limit = Some(limit.to_string());
        self
    }

    pub fn with_min_match(mut self, min_match: impl ToString) -> Self {
        self.min_match = Some(min_match.to_string());
        self
    }

    /// Parse an HTTP query string such as `name=John+Smith&limit=10&minMatch=0.70`.
    ///
    /// Unknown keys are ignored; for repeated keys the last one wins.
    pub fn from_query_string(qs: &str) -> Self {
        let mut raw = Self::default();
        for pair in qs.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = decode_component(value);
            match decode_component(key).as_str() {
                "name" | "q" => raw.name = Some(value),
                "limit" => raw.limit = Some(value),
                "minMatch" | "min_match" => raw.min_match = Some(value),
                _ => {}
            }
        }
        raw
    }
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Broad classes of failure, used for status mapping and retry advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad caller input; never retried.
    Input,
    /// Index missing or no capacity; callers may retry.
    Resource,
    /// The caller's deadline passed.
    Timeout,
    /// Unexpected failure inside the service.
    Internal,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("missing required parameter: name")]
    MissingName,

    #[error("name {0:?} contains no searchable tokens")]
    EmptyName(String),

    #[error("invalid limit {0:?}: must be a positive integer")]
    InvalidLimit(String),

    #[error("invalid minMatch {0:?}: must be a number between 0 and 1")]
    InvalidMinMatch(String),

    #[error("watchlist index is not loaded")]
    IndexUnavailable,

    #[error("no search slot became free within {0:?}")]
    Overloaded(Duration),

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("search worker failed: {0}")]
    Internal(String),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingName
            | Self::EmptyName(_)
            | Self::InvalidLimit(_)
            | Self::InvalidMinMatch(_) => ErrorKind::Input,
            Self::IndexUnavailable | Self::Overloaded(_) => ErrorKind::Resource,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status an HTTP front end should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Input => 400,
            ErrorKind::Resource => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::Internal => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::Input
    }
}

/// One ranked watchlist match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Descending by score, ties in index order; never longer than the limit.
    pub hits: Vec<SearchHit>,
    pub limit: usize,
    pub min_match: f64,
    /// Epoch of the index snapshot the query ran against.
    pub index_epoch: u64,
    pub records_scanned: usize,
    pub elapsed_ms: u64,
}

/// Point-in-time service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub completed: u64,
    pub rejected: u64,
    pub overloaded: u64,
    pub timed_out: u64,
    pub unavailable: u64,
    pub in_flight: u64,
    pub max_concurrent: u64,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    rejected: AtomicU64,
    overloaded: AtomicU64,
    timed_out: AtomicU64,
    unavailable: AtomicU64,
}

pub struct SearchService {
    config: ServiceConfig,
    index: Arc<IndexHandle>,
    limiter: ConcurrencyLimiter,
    counters: Counters,
}

impl SearchService {
    pub fn new(config: ServiceConfig, index: Arc<IndexHandle>) -> Self {
        let limiter = ConcurrencyLimiter::new(config.max_concurrent);
        Self {
            config,
            index,
            limiter,
            counters: Counters::default(),
        }
    }

    /// Service with config from the environment.
    pub fn with_defaults(index: Arc<IndexHandle>) -> Self {
        Self::new(ServiceConfig::from_env(), index)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Handle the ingestion side uses to install refreshed indexes.
    pub fn index_handle(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    /// Turn raw caller parameters into a validated query.
    pub fn validate(&self, raw: &RawQuery) -> Result<Query, SearchError> {
        let name = raw
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(SearchError::MissingName)?;
        if tokenize(name).is_empty() {
            return Err(SearchError::EmptyName(name.to_string()));
        }

        let limit = match non_blank(&raw.limit) {
            None => self.config.default_limit,
            Some(s) => match s.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(SearchError::InvalidLimit(s.to_string())),
            },
        };
        let limit = if limit > self.config.max_limit {
            debug!(requested = limit, max = self.config.max_limit, "clamping limit");
            self.config.max_limit
        } else {
            limit
        };

        let min_match = match non_blank(&raw.min_match) {
            None => self.config.default_min_match,
            Some(s) => match s.parse::<f64>() {
                Ok(v) if (0.0..=1.0).contains(&v) => v,
                _ => return Err(SearchError::InvalidMinMatch(s.to_string())),
            },
        };

        Query::new(name, min_match, limit).ok_or_else(|| SearchError::EmptyName(name.to_string()))
    }

    /// Run a query with the configured default timeout.
    pub fn search(&self, raw: &RawQuery) -> Result<SearchResponse, SearchError> {
        self.search_with_timeout(raw, self.config.default_timeout())
    }

    /// Run a query; `timeout` covers both the wait for a slot and the scan.
    pub fn search_with_timeout(
        &self,
        raw: &RawQuery,
        timeout: Option<Duration>,
    ) -> Result<SearchResponse, SearchError> {
        let query = self.validate_counted(raw)?;
        let cancel = cancel_for(timeout);
        self.execute(&query, &cancel, timeout)
    }

    /// Async entry point: the scan runs on tokio's blocking pool.
    ///
    /// When `timeout` fires first the scan's token is cancelled, so the worker
    /// stops at its next chunk boundary instead of finishing unobserved.
    pub async fn search_async(
        self: &Arc<Self>,
        raw: RawQuery,
        timeout: Option<Duration>,
    ) -> Result<SearchResponse, SearchError> {
        let query = self.validate_counted(&raw)?;
        let cancel = cancel_for(timeout);

        let svc = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let task =
            tokio::task::spawn_blocking(move || svc.execute(&query, &worker_cancel, timeout));

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    return Err(SearchError::Timeout(limit));
                }
            },
            None => task.await,
        };

        joined.map_err(|e| SearchError::Internal(e.to_string()))?
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            overloaded: self.counters.overloaded.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            unavailable: self.counters.unavailable.load(Ordering::Relaxed),
            in_flight: self.limiter.in_flight() as u64,
            max_concurrent: self.limiter.capacity() as u64,
        }
    }

    fn validate_counted(&self, raw: &RawQuery) -> Result<Query, SearchError> {
        self.validate(raw).inspect_err(|e| {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "rejected query");
        })
    }

    fn execute(
        &self,
        query: &Query,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        let timed_out = || {
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            SearchError::Timeout(timeout.unwrap_or_default())
        };

        let wait = match cancel.deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(start)
                .min(self.config.slot_wait),
            None => self.config.slot_wait,
        };
        let Some(_slot) = self.limiter.acquire(wait) else {
            if cancel.is_cancelled() {
                return Err(timed_out());
            }
            self.counters.overloaded.fetch_add(1, Ordering::Relaxed);
            warn!(
                waited_ms = wait.as_millis() as u64,
                max_concurrent = self.limiter.capacity(),
                "search capacity exhausted"
            );
            return Err(SearchError::Overloaded(wait));
        };

        let Some(snapshot) = self.index.current() else {
            self.counters.unavailable.fetch_add(1, Ordering::Relaxed);
            warn!("search attempted before a watchlist index was installed");
            return Err(SearchError::IndexUnavailable);
        };

        let matches = match rank_cancellable(&snapshot, query, cancel) {
            Ok(matches) => matches,
            Err(Cancelled) => {
                warn!(
                    epoch = snapshot.epoch(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "search cancelled before completion"
                );
                return Err(timed_out());
            }
        };

        let hits: Vec<SearchHit> = matches
            .iter()
            .map(|m| SearchHit {
                id: m.record.id().to_string(),
                name: m.record.name().to_string(),
                score: m.score,
                metadata: m.record.metadata().clone(),
            })
            .collect();

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            query_tokens = query.tokens().len(),
            limit = query.limit(),
            min_match = query.min_match(),
            hits = hits.len(),
            epoch = snapshot.epoch(),
            elapsed_ms,
            "search complete"
        );

        Ok(SearchResponse {
            hits,
            limit: query.limit(),
            min_match: query.min_match(),
            index_epoch: snapshot.epoch(),
            records_scanned: snapshot.len(),
            elapsed_ms,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn cancel_for(timeout: Option<Duration>) -> CancelToken {
    match timeout {
        Some(t) => CancelToken::with_deadline(Instant::now() + t),
        None => CancelToken::new(),
    }
}
