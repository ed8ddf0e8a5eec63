//! Name normalization shared by watchlist records and queries.
//!
//! Records and queries must go through the exact same pipeline, otherwise a
//! query can never reach a perfect score against its own record.
//!
//! # Processing Pipeline
//!
//! 1. **Unicode NFC normalization** - "Mu\u{0308}ller" (decomposed) → "Müller" (composed)
//! 2. **Lower-casing** - Unicode aware, so "ÖZİL" folds as well as "SMITH"
//! 3. **Punctuation stripping** - removed, not replaced: "O'Brien" → "obrien"
//! 4. **Whitespace splitting** - any run of whitespace separates tokens
//!
//! Transliteration and diacritic folding are deliberately absent: "müller" and
//! "muller" stay distinct tokens and are only related through the scorer.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::model::types::NameToken;

/// Normalize a raw name into its canonical lower-case, punctuation-free form.
///
/// Tokens in the output are separated by a single space.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.nfc() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !keep_char(c) {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Split a raw name into normalized tokens.
pub fn tokenize(raw: &str) -> Vec<NameToken> {
    normalize_name(raw)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(NameToken::new)
        .collect()
}

fn keep_char(c: char) -> bool {
    c.is_alphanumeric() || is_combining_mark(c)
}
