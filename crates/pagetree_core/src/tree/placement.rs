//! Resolves a placement request against a live sibling set.

use crate::model::block::BlockId;
use crate::tree::order_key::{key_between, validate_order_key, OrderKeyError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Live sibling as seen by the order key allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingKey {
    pub id: BlockId,
    pub order_key: String,
}

/// Parsed placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Start,
    End,
    Before(BlockId),
    After(BlockId),
    /// Caller-supplied key used verbatim once its shape is checked.
    Explicit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// Named sibling is not a live child of the destination parent.
    SiblingNotFound(BlockId),
    /// Explicit key is malformed.
    InvalidExplicitKey(OrderKeyError),
    /// Explicit key equals a live sibling's key.
    KeyCollision { order_key: String, sibling: BlockId },
    /// Stored sibling keys cannot be bisected (corrupt sibling set).
    Allocation(OrderKeyError),
}

impl Display for PlacementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SiblingNotFound(id) => write!(f, "sibling block not found: {id}"),
            Self::InvalidExplicitKey(err) => write!(f, "{err}"),
            Self::KeyCollision { order_key, sibling } => {
                write!(f, "order key `{order_key}` is already used by sibling {sibling}")
            }
            Self::Allocation(err) => write!(f, "cannot allocate order key: {err}"),
        }
    }
}

impl Error for PlacementError {}

/// Allocates an order key for `placement` among `siblings`.
///
/// `siblings` must be sorted by `(order_key, id)` and must not contain the
/// block being placed. Existing keys are never modified.
pub fn allocate_order_key(
    siblings: &[SiblingKey],
    placement: &Placement,
) -> Result<String, PlacementError> {
    let key_at = |index: usize| siblings.get(index).map(|sibling| sibling.order_key.as_str());

    match placement {
        Placement::Start => {
            key_between(None, key_at(0)).map_err(PlacementError::Allocation)
        }
        Placement::End => {
            let last = siblings.len().checked_sub(1).and_then(key_at);
            key_between(last, None).map_err(PlacementError::Allocation)
        }
        Placement::Before(sibling) => {
            let index = position_of(siblings, *sibling)?;
            let lower = index.checked_sub(1).and_then(key_at);
            key_between(lower, key_at(index)).map_err(PlacementError::Allocation)
        }
        Placement::After(sibling) => {
            let index = position_of(siblings, *sibling)?;
            key_between(key_at(index), key_at(index + 1)).map_err(PlacementError::Allocation)
        }
        Placement::Explicit(order_key) => {
            validate_order_key(order_key).map_err(PlacementError::InvalidExplicitKey)?;
            if let Some(existing) = siblings
                .iter()
                .find(|sibling| sibling.order_key == *order_key)
            {
                return Err(PlacementError::KeyCollision {
                    order_key: order_key.clone(),
                    sibling: existing.id,
                });
            }
            Ok(order_key.clone())
        }
    }
}

fn position_of(siblings: &[SiblingKey], id: BlockId) -> Result<usize, PlacementError> {
    siblings
        .iter()
        .position(|sibling| sibling.id == id)
        .ok_or(PlacementError::SiblingNotFound(id))
}
