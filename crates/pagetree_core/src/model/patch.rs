//! Patch request/response wire model.
//!
//! # Responsibility
//! - Mirror the `ApplyPatch` JSON contract (camelCase field names, `op` and
//!   `where` tags) with serde.
//! - Provide builders so Rust callers can assemble patches without JSON.
//!
//! # Invariants
//! - Ids are carried as strings on the wire and parsed by the engine, so a
//!   malformed id surfaces as a `VALIDATION` error with a field path instead
//!   of a deserialization failure.
//! - `PatchResult` is serialized verbatim into the idempotency cache; its
//!   shape is part of the replay contract.

use crate::model::block::{BlockId, BlockType};
use crate::model::document::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only supported `apiVersion`.
pub const API_VERSION_V1: &str = "v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    pub api_version: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub ops: Vec<PatchOp>,
}

impl PatchRequest {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            api_version: API_VERSION_V1.to_string(),
            document_id: document_id.to_string(),
            base_version: None,
            idempotency_key: None,
            ops: Vec::new(),
        }
    }

    pub fn with_base_version(mut self, base_version: i64) -> Self {
        self.base_version = Some(base_version);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_op(mut self, op: impl Into<PatchOp>) -> Self {
        self.ops.push(op.into());
        self
    }
}

/// One structural edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    Insert(InsertOp),
    Update(UpdateOp),
    Move(MoveOp),
    Delete(DeleteOp),
}

impl PatchOp {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Move(_) => "move",
            Self::Delete(_) => "delete",
        }
    }
}

/// Sibling placement vocabulary shared by insert and move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "where", rename_all = "snake_case")]
pub enum Place {
    Start,
    End,
    Before {
        #[serde(rename = "siblingBlockId")]
        sibling_block_id: String,
    },
    After {
        #[serde(rename = "siblingBlockId")]
        sibling_block_id: String,
    },
}

impl Place {
    pub fn before(sibling: BlockId) -> Self {
        Self::Before {
            sibling_block_id: sibling.to_string(),
        }
    }

    pub fn after(sibling: BlockId) -> Self {
        Self::After {
            sibling_block_id: sibling.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOp {
    pub block_id: String,
    #[serde(default)]
    pub parent_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_key: Option<String>,
    pub block_type: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl InsertOp {
    /// Insert at the end of `parent`'s children unless re-placed.
    pub fn new(
        block_id: BlockId,
        parent: Option<BlockId>,
        block_type: BlockType,
        content: Value,
    ) -> Self {
        Self {
            block_id: block_id.to_string(),
            parent_block_id: parent.map(|id| id.to_string()),
            place: None,
            order_key: None,
            block_type: block_type.as_str().to_string(),
            content,
            meta: None,
        }
    }

    pub fn with_place(mut self, place: Place) -> Self {
        self.place = Some(place);
        self
    }

    pub fn with_order_key(mut self, order_key: impl Into<String>) -> Self {
        self.order_key = Some(order_key.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Fields to overwrite. Omitted fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOp {
    pub block_id: String,
    #[serde(default)]
    pub patch: BlockPatch,
}

impl UpdateOp {
    pub fn content(block_id: BlockId, content: Value) -> Self {
        Self {
            block_id: block_id.to_string(),
            patch: BlockPatch {
                content: Some(content),
                ..BlockPatch::default()
            },
        }
    }

    pub fn meta(block_id: BlockId, meta: Value) -> Self {
        Self {
            block_id: block_id.to_string(),
            patch: BlockPatch {
                meta: Some(meta),
                ..BlockPatch::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOp {
    pub block_id: String,
    #[serde(default)]
    pub new_parent_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_key: Option<String>,
}

impl MoveOp {
    pub fn new(block_id: BlockId, new_parent: Option<BlockId>, place: Place) -> Self {
        Self {
            block_id: block_id.to_string(),
            new_parent_block_id: new_parent.map(|id| id.to_string()),
            place: Some(place),
            order_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOp {
    pub block_id: String,
    #[serde(default)]
    pub subtree: bool,
}

impl DeleteOp {
    pub fn new(block_id: BlockId, subtree: bool) -> Self {
        Self {
            block_id: block_id.to_string(),
            subtree,
        }
    }
}

impl From<InsertOp> for PatchOp {
    fn from(value: InsertOp) -> Self {
        Self::Insert(value)
    }
}

impl From<UpdateOp> for PatchOp {
    fn from(value: UpdateOp) -> Self {
        Self::Update(value)
    }
}

impl From<MoveOp> for PatchOp {
    fn from(value: MoveOp) -> Self {
        Self::Move(value)
    }
}

impl From<DeleteOp> for PatchOp {
    fn from(value: DeleteOp) -> Self {
        Self::Delete(value)
    }
}

/// Block ids touched per op kind, de-duplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedIds {
    pub inserted_ids: Vec<BlockId>,
    pub updated_ids: Vec<BlockId>,
    pub moved_ids: Vec<BlockId>,
    pub deleted_ids: Vec<BlockId>,
}

impl AppliedIds {
    pub(crate) fn push_unique(list: &mut Vec<BlockId>, id: BlockId) {
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResult {
    pub api_version: String,
    pub document_id: DocumentId,
    pub previous_version: i64,
    pub new_version: i64,
    pub applied: AppliedIds,
}

/// Wire names of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    NotFoundDocument,
    NotFoundBlock,
    VersionConflict,
    InvariantParentDeleted,
    InvariantCrossDocument,
    InvariantCycle,
    /// Storage failure outside the patch taxonomy. The patch was rolled back.
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFoundDocument => "NOT_FOUND_DOCUMENT",
            Self::NotFoundBlock => "NOT_FOUND_BLOCK",
            Self::VersionConflict => "VERSION_CONFLICT",
            Self::InvariantParentDeleted => "INVARIANT_PARENT_DELETED",
            Self::InvariantCrossDocument => "INVARIANT_CROSS_DOCUMENT",
            Self::InvariantCycle => "INVARIANT_CYCLE",
            Self::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Tagged success/failure result returned across the JSON boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PatchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl PatchEnvelope {
    pub fn success(result: PatchResult) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}
