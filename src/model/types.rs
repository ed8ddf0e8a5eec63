//! Normalized entity structs.

use serde::{Deserialize, Serialize};

use crate::search::normalize::tokenize;

/// One normalized word of a name.
///
/// The `chars` slice is decoded once at construction so the scorer never
/// walks UTF-8 inside the per-record loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameToken {
    text: Box<str>,
    chars: Box<[char]>,
}

impl NameToken {
    pub fn new(text: impl Into<String>) -> Self {
        let text: String = text.into();
        let chars = text.chars().collect::<Vec<_>>().into_boxed_slice();
        Self {
            text: text.into_boxed_str(),
            chars,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }
}

impl AsRef<str> for NameToken {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// A watchlist entry as ingested: stable id, display name, opaque metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Immutable, pre-tokenized watchlist entry owned by a `RecordIndex`.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    id: String,
    name: String,
    tokens: Vec<NameToken>,
    metadata: serde_json::Value,
}

impl EntityRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let name = name.into();
        let tokens = tokenize(&name);
        Self {
            id: id.into(),
            name,
            tokens,
            metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized tokens; empty only when the display name has no word characters.
    pub fn tokens(&self) -> &[NameToken] {
        &self.tokens
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }
}

impl From<RawRecord> for EntityRecord {
    fn from(raw: RawRecord) -> Self {
        Self::new(raw.id, raw.name, raw.metadata)
    }
}
