//! Patch engine failure taxonomy.

use crate::db::DbError;
use crate::index::IndexError;
use crate::model::block::BlockId;
use crate::model::patch::{ErrorBody, ErrorCode};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reason a patch was rejected. Every variant rolls the whole patch back.
#[derive(Debug)]
pub enum PatchError {
    /// Malformed request, schema violation or forbidden field change.
    Validation {
        path: Option<String>,
        message: String,
    },
    /// Target document is missing or soft-deleted.
    DocumentNotFound(String),
    /// Named block (target, parent or sibling) is missing or unusable.
    BlockNotFound {
        path: Option<String>,
        block_id: BlockId,
    },
    /// `baseVersion` differs from the stored document version.
    VersionConflict { expected: i64, actual: i64 },
    /// Requested parent is soft-deleted.
    ParentDeleted { path: String, parent_id: BlockId },
    /// Block or parent belongs to another document.
    CrossDocument { path: String, block_id: BlockId },
    /// Move would make a block its own ancestor.
    Cycle {
        path: String,
        block_id: BlockId,
        parent_id: BlockId,
    },
    Repo(RepoError),
    Index(IndexError),
    /// Unexpected engine condition outside the storage layer.
    Internal(String),
}

impl PatchError {
    pub(crate) fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::DocumentNotFound(_) => ErrorCode::NotFoundDocument,
            Self::BlockNotFound { .. } => ErrorCode::NotFoundBlock,
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::ParentDeleted { .. } => ErrorCode::InvariantParentDeleted,
            Self::CrossDocument { .. } => ErrorCode::InvariantCrossDocument,
            Self::Cycle { .. } => ErrorCode::InvariantCycle,
            Self::Repo(_) | Self::Index(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Request field the failure points at, e.g. `ops[2].content.level`.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Validation { path, .. } | Self::BlockNotFound { path, .. } => path.as_deref(),
            Self::ParentDeleted { path, .. }
            | Self::CrossDocument { path, .. }
            | Self::Cycle { path, .. } => Some(path.as_str()),
            Self::DocumentNotFound(_) => Some("documentId"),
            Self::VersionConflict { .. } => Some("baseVersion"),
            Self::Repo(_) | Self::Index(_) | Self::Internal(_) => None,
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            path: self.path().map(str::to_string),
        }
    }
}

impl Display for PatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { path: Some(path), message } => write!(f, "{path}: {message}"),
            Self::Validation { path: None, message } => write!(f, "{message}"),
            Self::DocumentNotFound(id) => write!(f, "document not found: {id}"),
            Self::BlockNotFound { block_id, .. } => write!(f, "block not found: {block_id}"),
            Self::VersionConflict { expected, actual } => write!(
                f,
                "document version is {actual}, request was based on {expected}"
            ),
            Self::ParentDeleted { parent_id, .. } => {
                write!(f, "parent block is deleted: {parent_id}")
            }
            Self::CrossDocument { block_id, .. } => {
                write!(f, "block belongs to another document: {block_id}")
            }
            Self::Cycle {
                block_id,
                parent_id,
                ..
            } => write!(
                f,
                "move would create cycle: block {block_id} under parent {parent_id}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl Error for PatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Index(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PatchError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::BlockNotFound(block_id) => Self::BlockNotFound {
                path: None,
                block_id,
            },
            RepoError::DocumentNotFound(id) => Self::DocumentNotFound(id.to_string()),
            other => Self::Repo(other),
        }
    }
}

impl From<IndexError> for PatchError {
    fn from(value: IndexError) -> Self {
        Self::Index(value)
    }
}

impl From<DbError> for PatchError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for PatchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}
