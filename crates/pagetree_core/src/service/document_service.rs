//! Document read APIs and object-management seam.
//!
//! # Responsibility
//! - Create and soft-delete documents for hosts without their own object
//!   service.
//! - Serve documents, blocks, backlinks and search over visible state.
//!
//! # Invariants
//! - Every block listing applies the visibility rule: a block with any
//!   soft-deleted ancestor is hidden even though its own row is live.
//! - Tree listings are pre-order; siblings sort by `order_key, id`.

use crate::config::EngineConfig;
use crate::db::ensure_schema_ready;
use crate::model::block::{Block, BlockId};
use crate::model::document::{Document, DocumentId, NewDocument};
use crate::repo::block_repo::{BlockRepository, SqliteBlockRepository};
use crate::repo::document_repo::{DocumentRepository, SqliteDocumentRepository};
use crate::repo::link_repo::{LinkRepository, ReferenceEdge, SqliteLinkRepository};
use crate::repo::RepoResult;
use crate::search::fts::{search_blocks, BlockSearchHit, BlockSearchQuery, SearchResult};
use log::info;
use rusqlite::Connection;
use std::collections::HashMap;

/// Read-side service over one migrated connection.
pub struct DocumentService<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
}

impl<'conn> DocumentService<'conn> {
    /// Creates a service after checking the connection schema version.
    pub fn try_new(conn: &'conn Connection, config: EngineConfig) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn, config })
    }

    pub fn create_document(&self, input: &NewDocument) -> RepoResult<Document> {
        let document = SqliteDocumentRepository::new(self.conn).create_document(input)?;
        info!(
            "event=document_create module=service status=ok document_id={} type_ref={}",
            document.id, document.type_ref
        );
        Ok(document)
    }

    pub fn soft_delete_document(&self, id: DocumentId) -> RepoResult<()> {
        SqliteDocumentRepository::new(self.conn).soft_delete_document(id)?;
        info!("event=document_delete module=service status=ok document_id={id}");
        Ok(())
    }

    /// Live document by id.
    pub fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        SqliteDocumentRepository::new(self.conn).get_document(id, false)
    }

    /// Visible block by id.
    pub fn get_block(&self, id: BlockId) -> RepoResult<Option<Block>> {
        let blocks = SqliteBlockRepository::new(self.conn);
        if !blocks.is_visible(id)? {
            return Ok(None);
        }
        blocks.get_block(id)
    }

    /// Visible blocks of `document_id` in tree pre-order.
    pub fn list_blocks(&self, document_id: DocumentId) -> RepoResult<Vec<Block>> {
        let rows = SqliteBlockRepository::new(self.conn).list_visible_blocks(document_id)?;
        Ok(pre_order(rows))
    }

    /// Visible children of `parent` (top-level blocks when `None`).
    pub fn list_children(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
    ) -> RepoResult<Vec<Block>> {
        SqliteBlockRepository::new(self.conn).list_visible_children(document_id, parent)
    }

    /// Visible blocks referencing `document_id` (or one of its blocks).
    pub fn backlinks(
        &self,
        document_id: DocumentId,
        block_id: Option<BlockId>,
    ) -> RepoResult<Vec<ReferenceEdge>> {
        SqliteLinkRepository::new(self.conn).list_backlinks(document_id, block_id)
    }

    pub fn outgoing_references(&self, block_id: BlockId) -> RepoResult<Vec<ReferenceEdge>> {
        SqliteLinkRepository::new(self.conn).list_outgoing(block_id)
    }

    pub fn search(&self, query: &BlockSearchQuery) -> SearchResult<Vec<BlockSearchHit>> {
        search_blocks(self.conn, query, &self.config)
    }
}

/// Orders blocks depth-first. Input must already be sorted by
/// `order_key, id` within each parent.
fn pre_order(rows: Vec<Block>) -> Vec<Block> {
    let total = rows.len();
    let mut children: HashMap<Option<BlockId>, Vec<Block>> = HashMap::new();
    for block in rows {
        children.entry(block.parent_id).or_default().push(block);
    }

    let mut ordered = Vec::with_capacity(total);
    let mut stack: Vec<Block> = children.remove(&None).unwrap_or_default();
    stack.reverse();

    while let Some(block) = stack.pop() {
        if let Some(mut kids) = children.remove(&Some(block.id)) {
            kids.reverse();
            stack.extend(kids);
        }
        ordered.push(block);
    }
    ordered
}
