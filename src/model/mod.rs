//! Watchlist data model.

pub mod types;
