//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Create and soft-delete documents on behalf of the object-management
//!   layer.
//! - Expose existence/deletion state and the version counter to the patch
//!   engine.
//!
//! # Invariants
//! - New documents start at `doc_version = 0` and get a UUIDv7 id.
//! - `bump_version` is a compare-and-swap: it only advances from the version
//!   the caller observed.

use crate::model::document::{Document, DocumentId, NewDocument};
use crate::model::now_epoch_ms;
use crate::repo::{parse_json, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    type_ref,
    title,
    properties,
    doc_version,
    created_at,
    updated_at,
    deleted_at
FROM documents";

/// Repository interface for document rows.
pub trait DocumentRepository {
    fn create_document(&self, input: &NewDocument) -> RepoResult<Document>;
    fn get_document(&self, id: DocumentId, include_deleted: bool)
        -> RepoResult<Option<Document>>;
    fn soft_delete_document(&self, id: DocumentId) -> RepoResult<()>;
    /// Advances `doc_version` from `expected` to `expected + 1`.
    ///
    /// Returns `false` when the stored version no longer equals `expected`.
    fn bump_version(&self, id: DocumentId, expected: i64, updated_at: i64) -> RepoResult<bool>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn create_document(&self, input: &NewDocument) -> RepoResult<Document> {
        let now = now_epoch_ms();
        let document = Document {
            id: Uuid::now_v7(),
            type_ref: input.type_ref.clone(),
            title: input.title.clone(),
            properties: input.properties.clone(),
            doc_version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.conn.execute(
            "INSERT INTO documents (
                id,
                type_ref,
                title,
                properties,
                doc_version,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5);",
            params![
                document.id.to_string(),
                document.type_ref.as_str(),
                document.title.as_str(),
                document.properties.to_string(),
                now,
            ],
        )?;

        Ok(document)
    }

    fn get_document(
        &self,
        id: DocumentId,
        include_deleted: bool,
    ) -> RepoResult<Option<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR deleted_at IS NULL);"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), i64::from(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }

        Ok(None)
    }

    fn soft_delete_document(&self, id: DocumentId) -> RepoResult<()> {
        let now = now_epoch_ms();
        let changed = self.conn.execute(
            "UPDATE documents
             SET deleted_at = ?1,
                 updated_at = ?1
             WHERE id = ?2
               AND deleted_at IS NULL;",
            params![now, id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::DocumentNotFound(id));
        }

        Ok(())
    }

    fn bump_version(&self, id: DocumentId, expected: i64, updated_at: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE documents
             SET doc_version = doc_version + 1,
                 updated_at = ?1
             WHERE id = ?2
               AND doc_version = ?3
               AND deleted_at IS NULL;",
            params![updated_at, id.to_string(), expected],
        )?;
        Ok(changed == 1)
    }
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Document> {
    let id_text: String = row.get("id")?;
    let properties_text: String = row.get("properties")?;

    Ok(Document {
        id: parse_uuid(&id_text, "documents.id")?,
        type_ref: row.get("type_ref")?,
        title: row.get("title")?,
        properties: parse_json(&properties_text, "documents.properties")?,
        doc_version: row.get("doc_version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}
