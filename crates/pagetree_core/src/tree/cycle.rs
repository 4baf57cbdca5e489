//! Ancestor-walk cycle detection for block moves.

use crate::model::block::BlockId;
use std::collections::HashSet;

/// Returns `true` when attaching `node` under `candidate_parent` would make
/// `node` its own ancestor.
///
/// `parent_of` resolves one block's parent (`None` at document root). The
/// walk also reports a cycle when it revisits a block or exceeds `max_depth`
/// hops, so a corrupt parent chain can never loop forever.
pub fn would_create_cycle<E, F>(
    node: BlockId,
    candidate_parent: BlockId,
    max_depth: usize,
    mut parent_of: F,
) -> Result<bool, E>
where
    F: FnMut(BlockId) -> Result<Option<BlockId>, E>,
{
    let mut visited = HashSet::new();
    let mut cursor = Some(candidate_parent);
    let mut depth = 0usize;
    while let Some(current) = cursor {
        if current == node {
            return Ok(true);
        }
        if !visited.insert(current) {
            return Ok(true);
        }
        depth += 1;
        if depth > max_depth {
            return Ok(true);
        }
        cursor = parent_of(current)?;
    }
    Ok(false)
}
