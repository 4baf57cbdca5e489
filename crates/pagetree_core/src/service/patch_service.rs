//! Patch application use-case.
//!
//! # Responsibility
//! - Apply a batch of insert/update/move/delete ops to one document as a
//!   single all-or-nothing unit.
//! - Enforce optimistic concurrency (`baseVersion`) and idempotent replay.
//! - Expose the JSON boundary returning a tagged success/failure envelope.
//!
//! # Invariants
//! - One `IMMEDIATE` transaction spans the document lookup, idempotency
//!   lookup, every op, every derived-index write, the version bump and the
//!   idempotency write.
//! - A successful apply advances `doc_version` by exactly one.
//! - A replay returns the stored result; the only write it performs is
//!   expiring stale idempotency records of that document.
//! - Block content never reaches the log.

use crate::config::EngineConfig;
use crate::db::ensure_schema_ready;
use crate::model::document::DocumentId;
use crate::model::now_epoch_ms;
use crate::model::patch::{
    ErrorCode, PatchEnvelope, PatchRequest, PatchResult, API_VERSION_V1,
};
use crate::repo::document_repo::{DocumentRepository, SqliteDocumentRepository};
use crate::repo::idempotency_repo::{IdempotencyRepository, SqliteIdempotencyRepository};
use crate::repo::RepoResult;
use crate::schema::{BlockSchemaRegistry, ContentValidator};
use crate::service::patch_error::PatchError;
use crate::service::patch_ops::PatchContext;
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::time::Instant;
use uuid::Uuid;

const ENCODE_FAILURE_ENVELOPE: &str =
    r#"{"ok":false,"error":{"code":"INTERNAL","message":"failed to encode response"}}"#;

/// How a successful call was satisfied.
enum Outcome {
    Applied(PatchResult),
    Replayed(PatchResult),
}

/// Patch engine bound to a content validator and engine limits.
pub struct PatchEngine<V: ContentValidator = BlockSchemaRegistry> {
    validator: V,
    config: EngineConfig,
}

impl PatchEngine<BlockSchemaRegistry> {
    /// Engine with the built-in schema registry.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_validator(BlockSchemaRegistry::new(), config)
    }
}

impl Default for PatchEngine<BlockSchemaRegistry> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<V: ContentValidator> PatchEngine<V> {
    pub fn with_validator(validator: V, config: EngineConfig) -> Self {
        Self { validator, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies `request` atomically.
    ///
    /// # Errors
    /// Returns the first failure; nothing from the request is persisted.
    pub fn apply_patch(
        &self,
        conn: &mut Connection,
        request: &PatchRequest,
    ) -> Result<PatchResult, PatchError> {
        let started_at = Instant::now();
        match self.apply_in_transaction(conn, request) {
            Ok(Outcome::Applied(result)) => {
                info!(
                    "event=patch_apply module=service status=ok document_id={} ops={} previous_version={} new_version={} inserted={} updated={} moved={} deleted={} duration_ms={}",
                    result.document_id,
                    request.ops.len(),
                    result.previous_version,
                    result.new_version,
                    result.applied.inserted_ids.len(),
                    result.applied.updated_ids.len(),
                    result.applied.moved_ids.len(),
                    result.applied.deleted_ids.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(result)
            }
            Ok(Outcome::Replayed(result)) => {
                info!(
                    "event=patch_apply module=service status=replay document_id={} new_version={} duration_ms={}",
                    result.document_id,
                    result.new_version,
                    started_at.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(err) => {
                let code = err.code();
                let path = err.path().unwrap_or("-");
                if code == ErrorCode::Internal {
                    error!(
                        "event=patch_apply module=service status=error document_id={} error_code={} duration_ms={} error={}",
                        request.document_id,
                        code.as_str(),
                        started_at.elapsed().as_millis(),
                        err
                    );
                } else {
                    warn!(
                        "event=patch_apply module=service status=rejected document_id={} error_code={} path={} duration_ms={}",
                        request.document_id,
                        code.as_str(),
                        path,
                        started_at.elapsed().as_millis()
                    );
                }
                Err(err)
            }
        }
    }

    /// JSON boundary: parses a wire request and returns the serialized
    /// envelope. Never panics and never fails.
    pub fn apply_patch_json(&self, conn: &mut Connection, request_json: &str) -> String {
        let envelope = match serde_json::from_str::<PatchRequest>(request_json) {
            Ok(request) => match self.apply_patch(conn, &request) {
                Ok(result) => PatchEnvelope::success(result),
                Err(err) => PatchEnvelope::failure(err.to_error_body()),
            },
            Err(err) => {
                warn!(
                    "event=patch_apply module=service status=rejected error_code=VALIDATION path=- reason=malformed_json"
                );
                PatchEnvelope::failure(
                    PatchError::Validation {
                        path: None,
                        message: format!("malformed patch request: {err}"),
                    }
                    .to_error_body(),
                )
            }
        };

        serde_json::to_string(&envelope).unwrap_or_else(|_| ENCODE_FAILURE_ENVELOPE.to_string())
    }

    /// Deletes idempotency records older than the configured retention
    /// window across all documents.
    pub fn purge_expired_idempotency_records(&self, conn: &Connection) -> RepoResult<usize> {
        let cutoff = self.idempotency_cutoff(now_epoch_ms());
        let removed = SqliteIdempotencyRepository::new(conn).purge_all(cutoff)?;
        info!(
            "event=idempotency_purge module=service status=ok removed={} cutoff_ms={}",
            removed, cutoff
        );
        Ok(removed)
    }

    fn apply_in_transaction(
        &self,
        conn: &mut Connection,
        request: &PatchRequest,
    ) -> Result<Outcome, PatchError> {
        if request.api_version != API_VERSION_V1 {
            return Err(PatchError::validation(
                "apiVersion",
                format!(
                    "unsupported api version `{}`; expected `{API_VERSION_V1}`",
                    request.api_version
                ),
            ));
        }
        let document_id = parse_document_id(&request.document_id)?;
        let idempotency_key = self.checked_idempotency_key(request.idempotency_key.as_deref())?;

        ensure_schema_ready(conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_epoch_ms();

        let documents = SqliteDocumentRepository::new(&tx);
        let document = documents
            .get_document(document_id, false)?
            .ok_or_else(|| PatchError::DocumentNotFound(document_id.to_string()))?;

        if let Some(key) = idempotency_key {
            let records = SqliteIdempotencyRepository::new(&tx);
            let cutoff = self.idempotency_cutoff(now);
            records.purge_document(document_id, cutoff)?;
            if let Some(stored) = records.find_result(document_id, key, cutoff)? {
                let result: PatchResult = serde_json::from_str(&stored).map_err(|err| {
                    PatchError::Internal(format!("stored idempotency result is unreadable: {err}"))
                })?;
                tx.commit()?;
                return Ok(Outcome::Replayed(result));
            }
        }

        if let Some(base_version) = request.base_version {
            if base_version != document.doc_version {
                return Err(PatchError::VersionConflict {
                    expected: base_version,
                    actual: document.doc_version,
                });
            }
        }

        if request.ops.len() > self.config.max_ops_per_patch {
            return Err(PatchError::validation(
                "ops",
                format!(
                    "patch has {} ops; at most {} are allowed",
                    request.ops.len(),
                    self.config.max_ops_per_patch
                ),
            ));
        }

        let mut context = PatchContext::new(
            &tx,
            document_id,
            &self.validator,
            self.config.max_tree_depth,
            now,
        );
        for (index, op) in request.ops.iter().enumerate() {
            context.apply(index, op)?;
        }
        let applied = context.finish()?;

        if !documents.bump_version(document_id, document.doc_version, now)? {
            return Err(PatchError::Internal(format!(
                "document {document_id} changed version inside the patch transaction"
            )));
        }

        let result = PatchResult {
            api_version: API_VERSION_V1.to_string(),
            document_id,
            previous_version: document.doc_version,
            new_version: document.doc_version + 1,
            applied,
        };

        if let Some(key) = idempotency_key {
            let encoded = serde_json::to_string(&result).map_err(|err| {
                PatchError::Internal(format!("failed to encode patch result: {err}"))
            })?;
            SqliteIdempotencyRepository::new(&tx).insert_result(document_id, key, &encoded, now)?;
        }

        tx.commit()?;
        Ok(Outcome::Applied(result))
    }

    fn checked_idempotency_key<'r>(&self, key: Option<&'r str>) -> Result<Option<&'r str>, PatchError> {
        let Some(key) = key else {
            return Ok(None);
        };
        if key.trim().is_empty() {
            return Err(PatchError::validation("idempotencyKey", "must not be blank"));
        }
        if key.chars().count() > self.config.max_idempotency_key_len {
            return Err(PatchError::validation(
                "idempotencyKey",
                format!(
                    "must be at most {} characters",
                    self.config.max_idempotency_key_len
                ),
            ));
        }
        Ok(Some(key))
    }

    fn idempotency_cutoff(&self, now: i64) -> i64 {
        let ttl_ms = i64::try_from(self.config.idempotency_ttl().as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(ttl_ms)
    }
}

fn parse_document_id(raw: &str) -> Result<DocumentId, PatchError> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        PatchError::validation("documentId", format!("`{raw}` is not a valid document id"))
    })
}
