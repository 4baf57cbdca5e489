//! Reference edge persistence and backlink queries.
//!
//! # Invariants
//! - Edges are derived rows: only the index writer replaces or removes them.
//! - A source block holds at most one edge per `(target_document, target_block)`.
//! - Backlink and outgoing listings only include edges whose source block is
//!   visible. Sources are checked one ancestor chain at a time, so a listing
//!   never scans unrelated documents.

use crate::index::refs::ReferenceTarget;
use crate::model::block::BlockId;
use crate::model::document::DocumentId;
use crate::repo::block_repo::{BlockRepository, SqliteBlockRepository};
use crate::repo::{parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

/// One derived reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEdge {
    pub source_block_id: BlockId,
    pub source_document_id: DocumentId,
    pub target_document_id: DocumentId,
    pub target_block_id: Option<BlockId>,
}

/// Repository interface for reference edges.
pub trait LinkRepository {
    /// Replaces every edge sourced at `source_block` with `targets`.
    fn replace_references(
        &self,
        source_block: BlockId,
        source_document: DocumentId,
        targets: &[ReferenceTarget],
    ) -> RepoResult<()>;
    fn delete_references(&self, source_block: BlockId) -> RepoResult<usize>;
    /// Edges pointing at `target_document`, narrowed to `target_block` when
    /// given.
    fn list_backlinks(
        &self,
        target_document: DocumentId,
        target_block: Option<BlockId>,
    ) -> RepoResult<Vec<ReferenceEdge>>;
    fn list_outgoing(&self, source_block: BlockId) -> RepoResult<Vec<ReferenceEdge>>;
}

/// SQLite-backed reference edge repository.
pub struct SqliteLinkRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLinkRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LinkRepository for SqliteLinkRepository<'_> {
    fn replace_references(
        &self,
        source_block: BlockId,
        source_document: DocumentId,
        targets: &[ReferenceTarget],
    ) -> RepoResult<()> {
        self.delete_references(source_block)?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO block_references (
                source_block_id,
                source_document_id,
                target_document_id,
                target_block_id
            ) VALUES (?1, ?2, ?3, ?4);",
        )?;
        for target in targets {
            stmt.execute(params![
                source_block.to_string(),
                source_document.to_string(),
                target.document_id.to_string(),
                target.block_id.map(|id| id.to_string()),
            ])?;
        }
        Ok(())
    }

    fn delete_references(&self, source_block: BlockId) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM block_references WHERE source_block_id = ?1;",
            [source_block.to_string()],
        )?;
        Ok(removed)
    }

    fn list_backlinks(
        &self,
        target_document: DocumentId,
        target_block: Option<BlockId>,
    ) -> RepoResult<Vec<ReferenceEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                source_block_id,
                source_document_id,
                target_document_id,
                target_block_id
             FROM block_references
             WHERE target_document_id = ?1
               AND (?2 IS NULL OR target_block_id = ?2)
             ORDER BY source_document_id ASC, source_block_id ASC, id ASC;",
        )?;
        let mut rows = stmt.query(params![
            target_document.to_string(),
            target_block.map(|id| id.to_string()),
        ])?;

        let blocks = SqliteBlockRepository::new(self.conn);
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            let edge = parse_edge_row(row)?;
            if blocks.is_visible(edge.source_block_id)? {
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    fn list_outgoing(&self, source_block: BlockId) -> RepoResult<Vec<ReferenceEdge>> {
        if !SqliteBlockRepository::new(self.conn).is_visible(source_block)? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT
                source_block_id,
                source_document_id,
                target_document_id,
                target_block_id
             FROM block_references
             WHERE source_block_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([source_block.to_string()])?;

        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }
}

fn parse_edge_row(row: &Row<'_>) -> RepoResult<ReferenceEdge> {
    let source_block: String = row.get(0)?;
    let source_document: String = row.get(1)?;
    let target_document: String = row.get(2)?;
    let target_block = row
        .get::<_, Option<String>>(3)?
        .map(|value| parse_uuid(&value, "block_references.target_block_id"))
        .transpose()?;

    Ok(ReferenceEdge {
        source_block_id: parse_uuid(&source_block, "block_references.source_block_id")?,
        source_document_id: parse_uuid(&source_document, "block_references.source_document_id")?,
        target_document_id: parse_uuid(&target_document, "block_references.target_document_id")?,
        target_block_id: target_block,
    })
}
