//! Block repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the per-document block forest (parent pointer + order key).
//! - Provide sibling, ancestor and subtree lookups for the patch engine.
//! - Provide visibility-filtered listings for read APIs.
//!
//! # Invariants
//! - Rows are never physically deleted; `deleted_at` marks tombstones.
//! - Sibling listings are ordered by `order_key ASC, id ASC` (byte order).

use crate::model::block::{Block, BlockId, BlockType};
use crate::model::document::DocumentId;
use crate::repo::{parse_json, parse_uuid, RepoError, RepoResult, VISIBLE_DOCUMENT_BLOCKS_CTE};
use crate::tree::placement::SiblingKey;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

const BLOCK_COLUMNS: &str = "blocks.id AS id,
    blocks.document_id AS document_id,
    blocks.parent_id AS parent_id,
    blocks.order_key AS order_key,
    blocks.block_type AS block_type,
    blocks.content AS content,
    blocks.meta AS meta,
    blocks.created_at AS created_at,
    blocks.updated_at AS updated_at,
    blocks.deleted_at AS deleted_at";

/// Repository interface for block rows.
pub trait BlockRepository {
    fn insert_block(&self, block: &Block) -> RepoResult<()>;
    /// Loads one row regardless of tombstone or visibility state.
    fn get_block(&self, id: BlockId) -> RepoResult<Option<Block>>;
    /// Parent pointer of an existing row (`None` at document root).
    fn parent_of(&self, id: BlockId) -> RepoResult<Option<BlockId>>;
    /// Live children of `parent` (document root when `None`), minus `exclude`.
    fn list_sibling_keys(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
        exclude: Option<BlockId>,
    ) -> RepoResult<Vec<SiblingKey>>;
    /// Overwrites the given fields; `None` leaves a field untouched.
    fn update_fields(
        &self,
        id: BlockId,
        content: Option<&Value>,
        meta: Option<&Value>,
        updated_at: i64,
    ) -> RepoResult<()>;
    fn move_block(
        &self,
        id: BlockId,
        parent: Option<BlockId>,
        order_key: &str,
        updated_at: i64,
    ) -> RepoResult<()>;
    /// Returns `true` when the row was live and is now tombstoned.
    fn soft_delete_block(&self, id: BlockId, deleted_at: i64) -> RepoResult<bool>;
    /// Live blocks reachable from `root` through parent pointers, including
    /// `root` itself when live. Tombstoned intermediates are traversed.
    fn collect_live_subtree(&self, root: BlockId) -> RepoResult<Vec<BlockId>>;
    /// Visible blocks of one document ordered by `parent_id, order_key, id`.
    fn list_visible_blocks(&self, document_id: DocumentId) -> RepoResult<Vec<Block>>;
    fn list_visible_children(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
    ) -> RepoResult<Vec<Block>>;
    /// Walks `id`'s ancestor chain: visible when no row on it is tombstoned
    /// and it ends at a root of a live document.
    fn is_visible(&self, id: BlockId) -> RepoResult<bool>;
}

/// SQLite-backed block repository.
pub struct SqliteBlockRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlockRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl BlockRepository for SqliteBlockRepository<'_> {
    fn insert_block(&self, block: &Block) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO blocks (
                id,
                document_id,
                parent_id,
                order_key,
                block_type,
                content,
                meta,
                created_at,
                updated_at,
                deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                block.id.to_string(),
                block.document_id.to_string(),
                block.parent_id.map(|id| id.to_string()),
                block.order_key.as_str(),
                block.block_type.as_str(),
                block.content.to_string(),
                block.meta.as_ref().map(Value::to_string),
                block.created_at,
                block.updated_at,
                block.deleted_at,
            ],
        )?;
        Ok(())
    }

    fn get_block(&self, id: BlockId) -> RepoResult<Option<Block>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_block_row(row)?));
        }
        Ok(None)
    }

    fn parent_of(&self, id: BlockId) -> RepoResult<Option<BlockId>> {
        let parent: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT parent_id FROM blocks WHERE id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match parent {
            None => Err(RepoError::BlockNotFound(id)),
            Some(None) => Ok(None),
            Some(Some(text)) => Ok(Some(parse_uuid(&text, "blocks.parent_id")?)),
        }
    }

    fn list_sibling_keys(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
        exclude: Option<BlockId>,
    ) -> RepoResult<Vec<SiblingKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, order_key
             FROM blocks
             WHERE document_id = ?1
               AND parent_id IS ?2
               AND deleted_at IS NULL
               AND (?3 IS NULL OR id <> ?3)
             ORDER BY order_key ASC, id ASC;",
        )?;
        let mut rows = stmt.query(params![
            document_id.to_string(),
            parent.map(|id| id.to_string()),
            exclude.map(|id| id.to_string()),
        ])?;

        let mut siblings = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            siblings.push(SiblingKey {
                id: parse_uuid(&id_text, "blocks.id")?,
                order_key: row.get(1)?,
            });
        }
        Ok(siblings)
    }

    fn update_fields(
        &self,
        id: BlockId,
        content: Option<&Value>,
        meta: Option<&Value>,
        updated_at: i64,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE blocks
             SET content = COALESCE(?1, content),
                 meta = COALESCE(?2, meta),
                 updated_at = ?3
             WHERE id = ?4;",
            params![
                content.map(Value::to_string),
                meta.map(Value::to_string),
                updated_at,
                id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::BlockNotFound(id));
        }
        Ok(())
    }

    fn move_block(
        &self,
        id: BlockId,
        parent: Option<BlockId>,
        order_key: &str,
        updated_at: i64,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE blocks
             SET parent_id = ?1,
                 order_key = ?2,
                 updated_at = ?3
             WHERE id = ?4;",
            params![
                parent.map(|id| id.to_string()),
                order_key,
                updated_at,
                id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::BlockNotFound(id));
        }
        Ok(())
    }

    fn soft_delete_block(&self, id: BlockId, deleted_at: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE blocks
             SET deleted_at = ?1,
                 updated_at = ?1
             WHERE id = ?2
               AND deleted_at IS NULL;",
            params![deleted_at, id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn collect_live_subtree(&self, root: BlockId) -> RepoResult<Vec<BlockId>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id
                FROM blocks
                WHERE id = ?1
                UNION
                SELECT child.id
                FROM blocks child
                INNER JOIN subtree parent ON child.parent_id = parent.id
            )
            SELECT blocks.id
            FROM blocks
            INNER JOIN subtree ON subtree.id = blocks.id
            WHERE blocks.deleted_at IS NULL
            ORDER BY blocks.id ASC;",
        )?;

        let mut rows = stmt.query([root.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            ids.push(parse_uuid(&id_text, "blocks.id")?);
        }
        Ok(ids)
    }

    fn list_visible_blocks(&self, document_id: DocumentId) -> RepoResult<Vec<Block>> {
        let sql = format!(
            "{VISIBLE_DOCUMENT_BLOCKS_CTE}
             SELECT {BLOCK_COLUMNS}
             FROM blocks
             INNER JOIN visible ON visible.id = blocks.id
             ORDER BY blocks.parent_id ASC, blocks.order_key ASC, blocks.id ASC;"
        );
        query_blocks(self.conn, &sql, params![document_id.to_string()])
    }

    fn list_visible_children(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
    ) -> RepoResult<Vec<Block>> {
        let sql = format!(
            "{VISIBLE_DOCUMENT_BLOCKS_CTE}
             SELECT {BLOCK_COLUMNS}
             FROM blocks
             INNER JOIN visible ON visible.id = blocks.id
             WHERE blocks.parent_id IS ?2
             ORDER BY blocks.order_key ASC, blocks.id ASC;"
        );
        query_blocks(
            self.conn,
            &sql,
            params![document_id.to_string(), parent.map(|id| id.to_string())],
        )
    }

    fn is_visible(&self, id: BlockId) -> RepoResult<bool> {
        let visible: i64 = self.conn.query_row(
            "WITH RECURSIVE ancestors(id, parent_id, document_id, deleted_at) AS (
                SELECT id, parent_id, document_id, deleted_at
                FROM blocks
                WHERE id = ?1
                UNION
                SELECT parent.id, parent.parent_id, parent.document_id, parent.deleted_at
                FROM blocks parent
                INNER JOIN ancestors child ON child.parent_id = parent.id
            )
            SELECT
                NOT EXISTS(SELECT 1 FROM ancestors WHERE deleted_at IS NOT NULL)
                AND EXISTS(
                    SELECT 1
                    FROM ancestors root
                    INNER JOIN documents d ON d.id = root.document_id
                    WHERE root.parent_id IS NULL
                      AND d.deleted_at IS NULL
                );",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(visible == 1)
    }
}

fn query_blocks(
    conn: &Connection,
    sql: &str,
    bind: impl rusqlite::Params,
) -> RepoResult<Vec<Block>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(bind)?;
    let mut blocks = Vec::new();
    while let Some(row) = rows.next()? {
        blocks.push(parse_block_row(row)?);
    }
    Ok(blocks)
}

fn parse_block_row(row: &Row<'_>) -> RepoResult<Block> {
    let id_text: String = row.get("id")?;
    let document_text: String = row.get("document_id")?;
    let parent_id = row
        .get::<_, Option<String>>("parent_id")?
        .map(|value| parse_uuid(&value, "blocks.parent_id"))
        .transpose()?;

    let type_text: String = row.get("block_type")?;
    let block_type = BlockType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid block type `{type_text}` in blocks.block_type"))
    })?;

    let content_text: String = row.get("content")?;
    let meta = row
        .get::<_, Option<String>>("meta")?
        .map(|value| parse_json(&value, "blocks.meta"))
        .transpose()?;

    Ok(Block {
        id: parse_uuid(&id_text, "blocks.id")?,
        document_id: parse_uuid(&document_text, "blocks.document_id")?,
        parent_id,
        order_key: row.get("order_key")?,
        block_type,
        content: parse_json(&content_text, "blocks.content")?,
        meta,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}
