//! Token alignment between a query name and a candidate name.
//!
//! Every query token is paired with its most similar candidate token and the
//! per-token bests are averaged, each query token weighted equally. The pairing
//! is greedy and non-bijective: one candidate token may be the best match of
//! several query tokens. Candidate tokens nobody picked neither help nor hurt.
//!
//! Ties between candidate tokens go to the leftmost one, which only matters for
//! [`explain`] since the aggregate score is the same either way.

use serde::Serialize;

use super::similarity::similarity_chars;
use crate::model::types::NameToken;

/// Align two token sequences given as plain strings.
///
/// Tokens are compared as given; callers are expected to pass normalized text.
pub fn align<Q: AsRef<str>, C: AsRef<str>>(query: &[Q], candidate: &[C]) -> f64 {
    let query: Vec<NameToken> = query.iter().map(|t| NameToken::new(t.as_ref())).collect();
    let candidate: Vec<NameToken> = candidate
        .iter()
        .map(|t| NameToken::new(t.as_ref()))
        .collect();
    align_tokens(&query, &candidate)
}

/// Align pre-tokenized names. Allocation free; this runs once per record per query.
pub fn align_tokens(query: &[NameToken], candidate: &[NameToken]) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    let total: f64 = query
        .iter()
        .map(|q| best_match(q, candidate).1)
        .sum();

    (total / query.len() as f64).clamp(0.0, 1.0)
}

/// Best candidate for one query token: (leftmost index, score).
fn best_match(query: &NameToken, candidate: &[NameToken]) -> (usize, f64) {
    let mut best = (0usize, f64::NEG_INFINITY);
    for (idx, c) in candidate.iter().enumerate() {
        let score = similarity_chars(query.chars(), c.chars());
        if score > best.1 {
            best = (idx, score);
            if score >= 1.0 {
                break;
            }
        }
    }
    best
}

/// One query token and the candidate token it was paired with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenPairing {
    pub query_token: String,
    pub candidate_index: usize,
    pub candidate_token: String,
    pub score: f64,
}

/// Full breakdown of an alignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alignment {
    pub score: f64,
    pub pairs: Vec<TokenPairing>,
}

/// Alignment with its per-token pairings, for display and auditing.
///
/// `explain(q, c).score == align_tokens(q, c)` always holds.
pub fn explain(query: &[NameToken], candidate: &[NameToken]) -> Alignment {
    if query.is_empty() || candidate.is_empty() {
        return Alignment {
            score: 0.0,
            pairs: Vec::new(),
        };
    }

    let pairs: Vec<TokenPairing> = query
        .iter()
        .map(|q| {
            let (idx, score) = best_match(q, candidate);
            TokenPairing {
                query_token: q.as_str().to_string(),
                candidate_index: idx,
                candidate_token: candidate[idx].as_str().to_string(),
                score,
            }
        })
        .collect();

    let total: f64 = pairs.iter().map(|p| p.score).sum();
    Alignment {
        score: (total / query.len() as f64).clamp(0.0, 1.0),
        pairs,
    }
}
