//! Search layer facade.
//!
//! This module provides the name-matching core, leaves first:
//!
//! - **[`normalize`]**: Name normalization and tokenization shared by records and queries.
//! - **[`similarity`]**: Jaro-Winkler scorer for single tokens.
//! - **[`align`]**: Greedy token alignment of multi-word names.
//! - **[`rank`]**: Full-scan ranking of a record index, thresholded and truncated.

pub mod align;
pub mod normalize;
pub mod rank;
pub mod similarity;

pub use align::{Alignment, TokenPairing, align, align_tokens, explain};
pub use rank::{CancelToken, Cancelled, MatchResult, Query, rank, rank_cancellable};
pub use similarity::similarity;
