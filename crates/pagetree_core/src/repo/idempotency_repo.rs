//! Idempotency record persistence.
//!
//! # Invariants
//! - One record per `(document_id, idempotency_key)`; records are written
//!   once and never updated.
//! - Records older than the retention cutoff are invisible to lookups even
//!   before they are purged.

use crate::model::document::DocumentId;
use crate::repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for idempotency records.
pub trait IdempotencyRepository {
    /// Stored result JSON for `(document_id, key)` created at or after
    /// `not_before` (epoch ms).
    fn find_result(
        &self,
        document_id: DocumentId,
        key: &str,
        not_before: i64,
    ) -> RepoResult<Option<String>>;
    fn insert_result(
        &self,
        document_id: DocumentId,
        key: &str,
        result_json: &str,
        created_at: i64,
    ) -> RepoResult<()>;
    /// Removes one document's records created before `cutoff`.
    fn purge_document(&self, document_id: DocumentId, cutoff: i64) -> RepoResult<usize>;
    /// Removes every record created before `cutoff`.
    fn purge_all(&self, cutoff: i64) -> RepoResult<usize>;
}

/// SQLite-backed idempotency repository.
pub struct SqliteIdempotencyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIdempotencyRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl IdempotencyRepository for SqliteIdempotencyRepository<'_> {
    fn find_result(
        &self,
        document_id: DocumentId,
        key: &str,
        not_before: i64,
    ) -> RepoResult<Option<String>> {
        let result = self
            .conn
            .query_row(
                "SELECT result
                 FROM idempotency_records
                 WHERE document_id = ?1
                   AND idempotency_key = ?2
                   AND created_at >= ?3;",
                params![document_id.to_string(), key, not_before],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn insert_result(
        &self,
        document_id: DocumentId,
        key: &str,
        result_json: &str,
        created_at: i64,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO idempotency_records (
                document_id,
                idempotency_key,
                result,
                created_at
            ) VALUES (?1, ?2, ?3, ?4);",
            params![document_id.to_string(), key, result_json, created_at],
        )?;
        Ok(())
    }

    fn purge_document(&self, document_id: DocumentId, cutoff: i64) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM idempotency_records
             WHERE document_id = ?1
               AND created_at < ?2;",
            params![document_id.to_string(), cutoff],
        )?;
        Ok(removed)
    }

    fn purge_all(&self, cutoff: i64) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM idempotency_records WHERE created_at < ?1;",
            [cutoff],
        )?;
        Ok(removed)
    }
}
