//! In-memory watchlist index and the atomically swappable "current index" cell.
//!
//! A [`RecordIndex`] never changes after construction. A refresh builds a new
//! one and installs it through [`IndexHandle::replace`]; readers take an
//! `Arc` snapshot with [`IndexHandle::current`] and keep using it for the
//! whole query, so a swap in the middle of a scan is invisible to them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use fxhash::FxHashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::types::{EntityRecord, RawRecord};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("duplicate record id {id:?} at positions {first} and {second}")]
    DuplicateId {
        id: String,
        first: usize,
        second: usize,
    },
    #[error("failed to read records from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{line}: invalid record: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

/// Immutable, ordered collection of watchlist records.
#[derive(Debug)]
pub struct RecordIndex {
    records: Vec<EntityRecord>,
    by_id: FxHashMap<String, usize>,
    epoch: u64,
    built_at_ms: i64,
}

impl RecordIndex {
    /// Build an index, preserving record order. Ids must be unique.
    pub fn new(records: Vec<EntityRecord>) -> Result<Self, IndexError> {
        let mut by_id = FxHashMap::default();
        by_id.reserve(records.len());
        for (pos, record) in records.iter().enumerate() {
            if let Some(first) = by_id.insert(record.id().to_string(), pos) {
                return Err(IndexError::DuplicateId {
                    id: record.id().to_string(),
                    first,
                    second: pos,
                });
            }
        }

        Ok(Self {
            records,
            by_id,
            epoch: 0,
            built_at_ms: now_ms(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntityRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.by_id.get(id).map(|&pos| &self.records[pos])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Generation assigned when installed into an [`IndexHandle`]; 0 if never installed.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn built_at_ms(&self) -> i64 {
        self.built_at_ms
    }
}

impl<'a> IntoIterator for &'a RecordIndex {
    type Item = &'a EntityRecord;
    type IntoIter = std::slice::Iter<'a, EntityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Shared pointer to the index currently used for queries.
///
/// The lock only guards the `Arc` itself: it is held for a clone or a swap,
/// never while a query is scanning.
#[derive(Debug, Default)]
pub struct IndexHandle {
    current: RwLock<Option<Arc<RecordIndex>>>,
    epoch: AtomicU64,
}

impl IndexHandle {
    /// Handle with no index installed yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_index(index: RecordIndex) -> Self {
        let handle = Self::empty();
        handle.replace(index);
        handle
    }

    /// Snapshot of the current index, if one has been installed.
    pub fn current(&self) -> Option<Arc<RecordIndex>> {
        self.current.read().clone()
    }

    /// Install a freshly built index; returns its epoch.
    pub fn replace(&self, mut index: RecordIndex) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        index.epoch = epoch;
        let records = index.len();
        let previous = self.current.write().replace(Arc::new(index));
        info!(
            epoch,
            records,
            previous_epoch = previous.as_ref().map(|p| p.epoch),
            "installed watchlist index"
        );
        epoch
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Epoch of the most recently installed index (0 if none).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

/// Load records from a JSON Lines file, one `{"id", "name", "metadata"}` object per line.
pub fn load_jsonl(path: &Path) -> Result<RecordIndex, IndexError> {
    let file = File::open(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(trimmed).map_err(|source| IndexError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push(EntityRecord::from(raw));
    }

    debug!(path = %path.display(), records = records.len(), "parsed watchlist records");
    RecordIndex::new(records)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
