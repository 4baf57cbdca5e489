//! Per-op handlers of the patch engine.
//!
//! # Responsibility
//! - Resolve ids, placements and parents for insert/update/move/delete.
//! - Enforce tree invariants (same document, live parent, no cycles).
//! - Record which blocks need their derived rows recomputed.
//!
//! # Invariants
//! - Handlers only write through the transaction handed to
//!   [`PatchContext::new`]; the engine decides commit or rollback.
//! - Derived rows are recomputed once per touched block in
//!   [`PatchContext::finish`], after every op has succeeded.

use crate::index::{reindex_block, remove_block};
use crate::model::block::{Block, BlockId, BlockType};
use crate::model::document::DocumentId;
use crate::model::patch::{AppliedIds, DeleteOp, InsertOp, MoveOp, PatchOp, Place, UpdateOp};
use crate::repo::block_repo::{BlockRepository, SqliteBlockRepository};
use crate::schema::{ContentValidator, SchemaViolation};
use crate::service::patch_error::PatchError;
use crate::tree::cycle::would_create_cycle;
use crate::tree::placement::{allocate_order_key, Placement, PlacementError};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

pub(crate) struct PatchContext<'a, V: ContentValidator> {
    blocks: SqliteBlockRepository<'a>,
    conn: &'a Connection,
    document_id: DocumentId,
    validator: &'a V,
    max_tree_depth: usize,
    now: i64,
    applied: AppliedIds,
    /// Blocks whose content changed or that were tombstoned.
    touched: BTreeSet<BlockId>,
}

impl<'a, V: ContentValidator> PatchContext<'a, V> {
    pub(crate) fn new(
        conn: &'a Connection,
        document_id: DocumentId,
        validator: &'a V,
        max_tree_depth: usize,
        now: i64,
    ) -> Self {
        Self {
            blocks: SqliteBlockRepository::new(conn),
            conn,
            document_id,
            validator,
            max_tree_depth,
            now,
            applied: AppliedIds::default(),
            touched: BTreeSet::new(),
        }
    }

    pub(crate) fn apply(&mut self, index: usize, op: &PatchOp) -> Result<(), PatchError> {
        let at = format!("ops[{index}]");
        match op {
            PatchOp::Insert(op) => self.insert(&at, op),
            PatchOp::Update(op) => self.update(&at, op),
            PatchOp::Move(op) => self.move_block(&at, op),
            PatchOp::Delete(op) => self.delete(&at, op),
        }
    }

    /// Recomputes derived rows for every touched block and returns the
    /// applied id lists.
    pub(crate) fn finish(self) -> Result<AppliedIds, PatchError> {
        for block_id in &self.touched {
            match self.blocks.get_block(*block_id)? {
                Some(block) => reindex_block(self.conn, &block)?,
                None => remove_block(self.conn, *block_id)?,
            }
        }
        Ok(self.applied)
    }

    fn insert(&mut self, at: &str, op: &InsertOp) -> Result<(), PatchError> {
        let block_id = parse_id(&op.block_id, &format!("{at}.blockId"))?;
        let block_type = BlockType::parse(&op.block_type).ok_or_else(|| {
            PatchError::validation(
                format!("{at}.blockType"),
                format!("unknown block type `{}`", op.block_type),
            )
        })?;

        if self.blocks.get_block(block_id)?.is_some() {
            return Err(PatchError::validation(
                format!("{at}.blockId"),
                format!("block already exists: {block_id}"),
            ));
        }

        let parent = parse_optional_id(op.parent_block_id.as_deref(), &format!("{at}.parentBlockId"))?;
        if let Some(parent_id) = parent {
            self.require_parent(parent_id, &format!("{at}.parentBlockId"))?;
        }

        self.validator
            .validate(block_type, &op.content)
            .map_err(|violation| violation_at(at, violation))?;
        check_meta(op.meta.as_ref(), &format!("{at}.meta"))?;

        let placement = resolve_placement(at, op.place.as_ref(), op.order_key.as_deref())?;
        let siblings = self.blocks.list_sibling_keys(self.document_id, parent, None)?;
        let order_key = allocate_order_key(&siblings, &placement)
            .map_err(|err| placement_error(at, err))?;

        self.blocks.insert_block(&Block {
            id: block_id,
            document_id: self.document_id,
            parent_id: parent,
            order_key,
            block_type,
            content: op.content.clone(),
            meta: op.meta.clone(),
            created_at: self.now,
            updated_at: self.now,
            deleted_at: None,
        })?;

        AppliedIds::push_unique(&mut self.applied.inserted_ids, block_id);
        self.touched.insert(block_id);
        Ok(())
    }

    fn update(&mut self, at: &str, op: &UpdateOp) -> Result<(), PatchError> {
        let path = format!("{at}.blockId");
        let block_id = parse_id(&op.block_id, &path)?;
        let block = self.require_live_block(block_id, &path)?;

        if let Some(requested) = op.patch.block_type.as_deref() {
            if requested != block.block_type.as_str() {
                return Err(PatchError::validation(
                    format!("{at}.patch.blockType"),
                    format!(
                        "block type cannot change after creation (stored `{}`, requested `{requested}`)",
                        block.block_type
                    ),
                ));
            }
        }

        if let Some(content) = &op.patch.content {
            self.validator
                .validate(block.block_type, content)
                .map_err(|violation| violation_at(&format!("{at}.patch"), violation))?;
        }
        check_meta(op.patch.meta.as_ref(), &format!("{at}.patch.meta"))?;

        self.blocks.update_fields(
            block_id,
            op.patch.content.as_ref(),
            op.patch.meta.as_ref(),
            self.now,
        )?;

        AppliedIds::push_unique(&mut self.applied.updated_ids, block_id);
        if op
            .patch
            .content
            .as_ref()
            .is_some_and(|content| *content != block.content)
        {
            self.touched.insert(block_id);
        }
        Ok(())
    }

    fn move_block(&mut self, at: &str, op: &MoveOp) -> Result<(), PatchError> {
        let path = format!("{at}.blockId");
        let block_id = parse_id(&op.block_id, &path)?;
        self.require_live_block(block_id, &path)?;

        let parent_path = format!("{at}.newParentBlockId");
        let new_parent = parse_optional_id(op.new_parent_block_id.as_deref(), &parent_path)?;
        if let Some(parent_id) = new_parent {
            if parent_id == block_id {
                return Err(PatchError::Cycle {
                    path: parent_path,
                    block_id,
                    parent_id,
                });
            }
            self.require_parent(parent_id, &parent_path)?;

            let blocks = &self.blocks;
            let cycle = would_create_cycle(block_id, parent_id, self.max_tree_depth, |id| {
                blocks.parent_of(id)
            })?;
            if cycle {
                return Err(PatchError::Cycle {
                    path: parent_path,
                    block_id,
                    parent_id,
                });
            }
        }

        let placement = resolve_placement(at, op.place.as_ref(), op.order_key.as_deref())?;
        let siblings = self
            .blocks
            .list_sibling_keys(self.document_id, new_parent, Some(block_id))?;
        let order_key = allocate_order_key(&siblings, &placement)
            .map_err(|err| placement_error(at, err))?;

        self.blocks
            .move_block(block_id, new_parent, &order_key, self.now)?;
        AppliedIds::push_unique(&mut self.applied.moved_ids, block_id);
        Ok(())
    }

    fn delete(&mut self, at: &str, op: &DeleteOp) -> Result<(), PatchError> {
        let path = format!("{at}.blockId");
        let block_id = parse_id(&op.block_id, &path)?;
        let block = self
            .blocks
            .get_block(block_id)?
            .ok_or_else(|| PatchError::BlockNotFound {
                path: Some(path.clone()),
                block_id,
            })?;
        if block.document_id != self.document_id {
            return Err(PatchError::CrossDocument { path, block_id });
        }

        let targets = if op.subtree {
            self.blocks.collect_live_subtree(block_id)?
        } else if block.is_deleted() {
            Vec::new()
        } else {
            vec![block_id]
        };

        for target in targets {
            if self.blocks.soft_delete_block(target, self.now)? {
                AppliedIds::push_unique(&mut self.applied.deleted_ids, target);
                self.touched.insert(target);
            }
        }
        Ok(())
    }

    /// Existing, same-document, live block.
    fn require_live_block(&self, block_id: BlockId, path: &str) -> Result<Block, PatchError> {
        let not_found = || PatchError::BlockNotFound {
            path: Some(path.to_string()),
            block_id,
        };
        let block = self.blocks.get_block(block_id)?.ok_or_else(not_found)?;
        if block.document_id != self.document_id {
            return Err(PatchError::CrossDocument {
                path: path.to_string(),
                block_id,
            });
        }
        if block.is_deleted() {
            return Err(not_found());
        }
        Ok(block)
    }

    /// Existing, live, same-document parent candidate.
    fn require_parent(&self, parent_id: BlockId, path: &str) -> Result<Block, PatchError> {
        let parent = self
            .blocks
            .get_block(parent_id)?
            .ok_or_else(|| PatchError::BlockNotFound {
                path: Some(path.to_string()),
                block_id: parent_id,
            })?;
        if parent.is_deleted() {
            return Err(PatchError::ParentDeleted {
                path: path.to_string(),
                parent_id,
            });
        }
        if parent.document_id != self.document_id {
            return Err(PatchError::CrossDocument {
                path: path.to_string(),
                block_id: parent_id,
            });
        }
        Ok(parent)
    }
}

fn parse_id(raw: &str, path: &str) -> Result<BlockId, PatchError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| PatchError::validation(path, format!("`{raw}` is not a valid block id")))
}

fn parse_optional_id(raw: Option<&str>, path: &str) -> Result<Option<BlockId>, PatchError> {
    raw.map(|value| parse_id(value, path)).transpose()
}

fn resolve_placement(
    at: &str,
    place: Option<&Place>,
    order_key: Option<&str>,
) -> Result<Placement, PatchError> {
    match (place, order_key) {
        (Some(_), Some(_)) => Err(PatchError::validation(
            format!("{at}.orderKey"),
            "`place` and `orderKey` are mutually exclusive",
        )),
        (None, Some(key)) => Ok(Placement::Explicit(key.to_string())),
        (None, None) | (Some(Place::End), None) => Ok(Placement::End),
        (Some(Place::Start), None) => Ok(Placement::Start),
        (Some(Place::Before { sibling_block_id }), None) => Ok(Placement::Before(parse_id(
            sibling_block_id,
            &format!("{at}.place.siblingBlockId"),
        )?)),
        (Some(Place::After { sibling_block_id }), None) => Ok(Placement::After(parse_id(
            sibling_block_id,
            &format!("{at}.place.siblingBlockId"),
        )?)),
    }
}

fn placement_error(at: &str, err: PlacementError) -> PatchError {
    match err {
        PlacementError::SiblingNotFound(block_id) => PatchError::BlockNotFound {
            path: Some(format!("{at}.place.siblingBlockId")),
            block_id,
        },
        PlacementError::InvalidExplicitKey(_) | PlacementError::KeyCollision { .. } => {
            PatchError::validation(format!("{at}.orderKey"), err.to_string())
        }
        PlacementError::Allocation(_) => PatchError::Internal(err.to_string()),
    }
}

fn violation_at(prefix: &str, violation: SchemaViolation) -> PatchError {
    PatchError::validation(format!("{prefix}.{}", violation.path), violation.message)
}

fn check_meta(meta: Option<&Value>, path: &str) -> Result<(), PatchError> {
    match meta {
        Some(value) if !value.is_object() => {
            Err(PatchError::validation(path, "must be an object"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_placement;
    use crate::model::patch::{ErrorCode, Place};
    use crate::tree::placement::Placement;
    use uuid::Uuid;

    #[test]
    fn missing_placement_defaults_to_end() {
        assert_eq!(resolve_placement("ops[0]", None, None).unwrap(), Placement::End);
    }

    #[test]
    fn place_and_order_key_are_exclusive() {
        let err = resolve_placement("ops[3]", Some(&Place::Start), Some("V")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(err.path(), Some("ops[3].orderKey"));
    }

    #[test]
    fn sibling_ids_are_parsed() {
        let sibling = Uuid::new_v4();
        assert_eq!(
            resolve_placement("ops[0]", Some(&Place::after(sibling)), None).unwrap(),
            Placement::After(sibling)
        );

        let bad = Place::Before {
            sibling_block_id: "nope".to_string(),
        };
        let err = resolve_placement("ops[1]", Some(&bad), None).unwrap_err();
        assert_eq!(err.path(), Some("ops[1].place.siblingBlockId"));
    }
}
