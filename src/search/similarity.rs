//! Jaro-Winkler similarity between two single tokens.
//!
//! Scores live in `[0, 1]`. The function is pure, deterministic and symmetric:
//! the pair is put into a canonical order before matching, so the greedy
//! match/transposition count can never depend on argument order.
//!
//! Unlike most Jaro-Winkler implementations there is no boost threshold: the
//! common-prefix bonus is applied to every pair.

use std::cmp::Ordering;

use smallvec::{SmallVec, smallvec};

/// Winkler prefix scaling constant.
pub const PREFIX_SCALE: f64 = 0.1;

/// Longest common prefix that earns the Winkler bonus.
pub const MAX_PREFIX: usize = 4;

/// Tokens up to this many chars keep their match flags on the stack.
const INLINE_CHARS: usize = 64;

type Flags = SmallVec<[bool; INLINE_CHARS]>;

/// Jaro-Winkler similarity of two strings, compared char by char.
///
/// Both empty scores 1.0; exactly one empty scores 0.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: SmallVec<[char; INLINE_CHARS]> = a.chars().collect();
    let b: SmallVec<[char; INLINE_CHARS]> = b.chars().collect();
    similarity_chars(&a, &b)
}

/// Jaro-Winkler similarity over pre-decoded tokens. Used on the hot path.
pub fn similarity_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let (a, b) = canonical_order(a, b);
    let jaro = jaro_chars(a, b);
    let prefix = common_prefix(a, b);

    (jaro + prefix as f64 * PREFIX_SCALE * (1.0 - jaro)).min(1.0)
}

/// Plain Jaro similarity (no prefix bonus).
pub fn jaro(a: &str, b: &str) -> f64 {
    let a: SmallVec<[char; INLINE_CHARS]> = a.chars().collect();
    let b: SmallVec<[char; INLINE_CHARS]> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let (a, b) = canonical_order(&a, &b);
    jaro_chars(a, b)
}

fn canonical_order<'a>(a: &'a [char], b: &'a [char]) -> (&'a [char], &'a [char]) {
    match a.len().cmp(&b.len()).then_with(|| a.cmp(b)) {
        Ordering::Greater => (b, a),
        _ => (a, b),
    }
}

fn jaro_chars(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);

    let mut a_flags: Flags = smallvec![false; a.len()];
    let mut b_flags: Flags = smallvec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        for j in lo..hi {
            if !b_flags[j] && b[j] == *ca {
                a_flags[i] = true;
                b_flags[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    // Walk both matched subsequences in order; every mismatch is half a transposition.
    let mut half_transpositions = 0usize;
    let mut b_matched = b
        .iter()
        .zip(b_flags.iter())
        .filter_map(|(c, flagged)| flagged.then_some(c));
    for (ca, _) in a.iter().zip(a_flags.iter()).filter(|(_, f)| **f) {
        if let Some(cb) = b_matched.next()
            && ca != cb
        {
            half_transpositions += 1;
        }
    }
    let transpositions = half_transpositions / 2;

    let m = matches as f64;
    ((m / a.len() as f64) + (m / b.len() as f64) + ((m - transpositions as f64) / m)) / 3.0
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .zip(b.iter())
        .take(MAX_PREFIX)
        .take_while(|(x, y)| x == y)
        .count()
}
