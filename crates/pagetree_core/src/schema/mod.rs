//! Block content validation seam.
//!
//! # Responsibility
//! - Define the contract the patch engine calls at insert and content-update
//!   time.
//! - Ship a built-in registry covering every `BlockType`.
//!
//! # Invariants
//! - Validators report only the first violation.
//! - Violation paths are rooted at `content` so callers can prefix them with
//!   the op location.

pub mod registry;

pub use registry::BlockSchemaRegistry;

use crate::model::block::BlockType;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// First shape violation found in one content payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Dotted/indexed field path, e.g. `content.inline[1].text`.
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl Display for SchemaViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl Error for SchemaViolation {}

/// Checks block content shape per block type.
pub trait ContentValidator {
    fn validate(&self, block_type: BlockType, content: &serde_json::Value)
        -> Result<(), SchemaViolation>;
}
