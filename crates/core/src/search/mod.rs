//! Search primitives: ranked result types and metadata filtering.

/// Metadata filtering predicates.
pub mod filter;
/// Ranked result types.
pub mod types;

pub use filter::matches_filter;
pub use types::{Neighbor, QueryHit};
