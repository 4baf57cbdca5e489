//! Block domain model.
//!
//! # Responsibility
//! - Define the typed content node stored per document.
//! - Map block types to and from their stable storage names.
//!
//! # Invariants
//! - `block_type` is fixed at creation; updates never change it.
//! - `order_key` is unique among live siblings of the same parent.
//! - `deleted_at` is the source of truth for tombstone state.

use crate::model::document::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one block. Client-supplied on insert.
pub type BlockId = Uuid;

/// Content node kind. Determines the shape of `Block::content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Paragraph,
    Heading,
    List,
    ListItem,
    Blockquote,
    Callout,
    CodeBlock,
    Table,
    ThematicBreak,
    MathBlock,
    FootnoteDef,
    Attachment,
}

impl BlockType {
    pub const ALL: [BlockType; 12] = [
        BlockType::Paragraph,
        BlockType::Heading,
        BlockType::List,
        BlockType::ListItem,
        BlockType::Blockquote,
        BlockType::Callout,
        BlockType::CodeBlock,
        BlockType::Table,
        BlockType::ThematicBreak,
        BlockType::MathBlock,
        BlockType::FootnoteDef,
        BlockType::Attachment,
    ];

    /// Storage and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::List => "list",
            Self::ListItem => "list_item",
            Self::Blockquote => "blockquote",
            Self::Callout => "callout",
            Self::CodeBlock => "code_block",
            Self::Table => "table",
            Self::ThematicBreak => "thematic_break",
            Self::MathBlock => "math_block",
            Self::FootnoteDef => "footnote_def",
            Self::Attachment => "attachment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|block_type| block_type.as_str() == value)
    }
}

impl Display for BlockType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted block row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    pub document_id: DocumentId,
    /// `None` means top-level block of the document.
    pub parent_id: Option<BlockId>,
    pub order_key: String,
    pub block_type: BlockType,
    /// Shape depends on `block_type`; see `schema::registry`.
    pub content: Value,
    pub meta: Option<Value>,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
    /// Epoch ms soft-delete tombstone.
    pub deleted_at: Option<i64>,
}

impl Block {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
