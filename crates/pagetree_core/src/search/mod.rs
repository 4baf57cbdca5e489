//! Full-text search entry points.
//!
//! # Responsibility
//! - Expose query APIs backed by the SQLite FTS5 index over block text.
//! - Own the `block_search` rows that feed the index.

pub mod fts;
