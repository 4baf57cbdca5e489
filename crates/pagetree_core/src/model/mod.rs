//! Domain model for documents, blocks and patch requests.
//!
//! # Responsibility
//! - Define the records persisted by the document and block stores.
//! - Define the wire shapes of patch requests and results.
//!
//! # Invariants
//! - Every document and block is identified by a stable UUID.
//! - Deletion is represented by soft-delete timestamps, not row removal.

pub mod block;
pub mod document;
pub mod patch;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
