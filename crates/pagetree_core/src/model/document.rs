//! Document ("object") domain model.
//!
//! The patch engine only reads existence/deletion state and bumps
//! `doc_version`; title and properties belong to the object-metadata layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable, time-sortable document identifier.
pub type DocumentId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub type_ref: String,
    pub title: String,
    /// Free-form property map (JSON object).
    pub properties: Value,
    /// Monotonic; starts at 0 and increases by one per applied patch.
    pub doc_version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl Document {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating a document through the object-management seam.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub type_ref: String,
    pub title: String,
    pub properties: Value,
}

impl NewDocument {
    pub fn new(type_ref: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            type_ref: type_ref.into(),
            title: title.into(),
            properties: Value::Object(Default::default()),
        }
    }
}
