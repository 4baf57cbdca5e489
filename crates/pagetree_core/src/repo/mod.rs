//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for documents, blocks,
//!   reference edges and idempotency records.
//! - Isolate SQLite query details from the patch engine and read services.
//!
//! # Invariants
//! - Repositories never open transactions; callers pass a connection or a
//!   transaction (via deref) and own atomicity.
//! - Read-model listings apply the visibility rule: a block is visible when
//!   it, every ancestor, and its document are not soft-deleted.

pub mod block_repo;
pub mod document_repo;
pub mod idempotency_repo;
pub mod link_repo;

use crate::db::DbError;
use crate::model::block::BlockId;
use crate::model::document::DocumentId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    DocumentNotFound(DocumentId),
    BlockNotFound(BlockId),
    /// Persisted row cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::DocumentNotFound(id) => write!(f, "document not found: {id}"),
            Self::BlockNotFound(id) => write!(f, "block not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::DocumentNotFound(_) => None,
            Self::BlockNotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Recursive CTE `visible(id)` over every document. Append a query that
/// joins `visible`. Only unscoped search needs it; single blocks use
/// `is_visible`.
pub(crate) const VISIBLE_BLOCKS_CTE: &str = "WITH RECURSIVE visible(id) AS (
    SELECT b.id
    FROM blocks b
    INNER JOIN documents d ON d.id = b.document_id
    WHERE b.parent_id IS NULL
      AND b.deleted_at IS NULL
      AND d.deleted_at IS NULL
    UNION
    SELECT child.id
    FROM blocks child
    INNER JOIN visible parent ON child.parent_id = parent.id
    WHERE child.deleted_at IS NULL
)";

/// Same as [`VISIBLE_BLOCKS_CTE`] restricted to the document bound as `?1`.
pub(crate) const VISIBLE_DOCUMENT_BLOCKS_CTE: &str = "WITH RECURSIVE visible(id) AS (
    SELECT b.id
    FROM blocks b
    INNER JOIN documents d ON d.id = b.document_id
    WHERE b.document_id = ?1
      AND b.parent_id IS NULL
      AND b.deleted_at IS NULL
      AND d.deleted_at IS NULL
    UNION
    SELECT child.id
    FROM blocks child
    INNER JOIN visible parent ON child.parent_id = parent.id
    WHERE child.deleted_at IS NULL
)";

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_json(value: &str, column: &'static str) -> RepoResult<serde_json::Value> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid json in {column}: {err}")))
}
