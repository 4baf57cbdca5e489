//! Block-document storage and patch engine.
//! This crate is the single source of truth for document tree invariants.

pub mod config;
pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;
pub mod search;
pub mod service;
pub mod tree;

pub use config::{load_config, ConfigError, EngineConfig, LoggingConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError, DbResult};
pub use index::{extract_plain_text, extract_references, ReferenceTarget};
pub use logging::{active_logging, default_log_level, init_logging, ActiveLogging, LoggingError};
pub use model::block::{Block, BlockId, BlockType};
pub use model::document::{Document, DocumentId, NewDocument};
pub use model::patch::{
    AppliedIds, BlockPatch, DeleteOp, ErrorBody, ErrorCode, InsertOp, MoveOp, PatchEnvelope,
    PatchOp, PatchRequest, PatchResult, Place, UpdateOp, API_VERSION_V1,
};
pub use repo::link_repo::ReferenceEdge;
pub use repo::{RepoError, RepoResult};
pub use schema::{BlockSchemaRegistry, ContentValidator, SchemaViolation};
pub use search::fts::{BlockSearchHit, BlockSearchQuery, SearchError, SearchResult};
pub use service::document_service::DocumentService;
pub use service::patch_service::PatchEngine;
pub use service::PatchError;
