//! Pure tree algorithms shared by the patch engine: sibling order keys,
//! placement resolution, and ancestor-walk cycle detection.

pub mod cycle;
pub mod order_key;
pub mod placement;
