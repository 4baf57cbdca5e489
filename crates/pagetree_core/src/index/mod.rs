//! Derived-index maintenance for block content.
//!
//! # Responsibility
//! - Project block content into search text and reference edges.
//! - Keep `block_search` and `block_references` exactly consistent with the
//!   blocks they describe.
//!
//! # Invariants
//! - Writes run on the caller's connection or transaction; they commit or
//!   roll back with the structural change that caused them.
//! - A tombstoned block has no search row and no outgoing edges.

pub mod refs;
pub mod text;

pub use refs::{extract_references, ReferenceTarget};
pub use text::extract_plain_text;

use crate::model::block::{Block, BlockId};
use crate::repo::link_repo::{LinkRepository, SqliteLinkRepository};
use crate::repo::RepoError;
use crate::search::fts::{remove_block_text, replace_block_text, SearchError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure while writing derived rows.
#[derive(Debug)]
pub enum IndexError {
    Repo(RepoError),
    Search(SearchError),
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "reference index write failed: {err}"),
            Self::Search(err) => write!(f, "search index write failed: {err}"),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Search(err) => Some(err),
        }
    }
}

impl From<RepoError> for IndexError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<SearchError> for IndexError {
    fn from(value: SearchError) -> Self {
        Self::Search(value)
    }
}

/// Recomputes both derived stores for one block from its current row.
///
/// Tombstoned blocks are routed to [`remove_block`].
pub fn reindex_block(conn: &Connection, block: &Block) -> Result<(), IndexError> {
    if block.is_deleted() {
        return remove_block(conn, block.id);
    }

    let plain_text = extract_plain_text(block.block_type, &block.content);
    replace_block_text(conn, block.id, block.document_id, &plain_text)?;

    let targets = extract_references(&block.content);
    SqliteLinkRepository::new(conn).replace_references(block.id, block.document_id, &targets)?;
    Ok(())
}

/// Drops every derived row sourced at `block_id`.
pub fn remove_block(conn: &Connection, block_id: BlockId) -> Result<(), IndexError> {
    remove_block_text(conn, block_id)?;
    SqliteLinkRepository::new(conn).delete_references(block_id)?;
    Ok(())
}
